//! `pipelinectl namespace create` and `pipelinectl namespace list`

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use pipeline_core::{
    store, Namespace, OwnerReference, DEVOPS_PROJECT_KIND, DEVOPS_PROJECT_LABEL,
};

#[derive(Subcommand, Debug)]
pub enum NamespaceCommand {
    /// Create a namespace, owned by a DevOps project unless --unmanaged.
    Create(CreateArgs),

    /// List namespaces and whether pipelines in them are synced.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub name: String,

    /// Owning DevOps project. Defaults to the namespace name.
    #[arg(long, short = 'p')]
    pub project: Option<String>,

    /// Create a plain namespace that the controller will not sync.
    #[arg(long, conflicts_with = "project")]
    pub unmanaged: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(root: &Path, cmd: NamespaceCommand) -> Result<()> {
    match cmd {
        NamespaceCommand::Create(args) => create(root, args),
        NamespaceCommand::List(args) => list(root, args),
    }
}

fn create(root: &Path, args: CreateArgs) -> Result<()> {
    let mut namespace = Namespace::new(&args.name);
    if !args.unmanaged {
        let project = args.project.unwrap_or_else(|| args.name.clone());
        namespace
            .metadata
            .labels
            .insert(DEVOPS_PROJECT_LABEL.to_string(), project.clone());
        namespace.metadata.owner_references.push(OwnerReference {
            kind: DEVOPS_PROJECT_KIND.to_string(),
            name: project,
            controller: Some(true),
        });
    }

    store::save_namespace_at(root, &namespace)
        .with_context(|| format!("failed to save namespace '{}'", args.name))?;

    if namespace.is_eligible() {
        println!("✓ namespace '{}' created", args.name);
    } else {
        println!(
            "✓ namespace '{}' created {}",
            args.name,
            "(unmanaged: pipelines here are not synced)".yellow()
        );
    }
    Ok(())
}

#[derive(Serialize, Tabled)]
struct NamespaceRow {
    #[tabled(rename = "namespace")]
    name: String,
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "managed")]
    managed: bool,
}

fn list(root: &Path, args: ListArgs) -> Result<()> {
    let rows: Vec<NamespaceRow> = store::list_namespaces_at(root)
        .context("failed to list namespaces")?
        .into_iter()
        .map(|ns| NamespaceRow {
            project: ns
                .metadata
                .labels
                .get(DEVOPS_PROJECT_LABEL)
                .cloned()
                .unwrap_or_default(),
            managed: ns.is_eligible(),
            name: ns.metadata.name,
        })
        .collect();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("failed to serialize namespaces")?
        );
        return Ok(());
    }

    if rows.is_empty() {
        println!("No namespaces. Run: pipelinectl namespace create <name>");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
