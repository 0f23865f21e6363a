//! pipelinectl: local pipeline store and reconciliation controller CLI.
//!
//! # Usage
//!
//! ```text
//! pipelinectl [--root <dir>] run [--workers N] [--config <file>] [--log-format text|json]
//! pipelinectl namespace create <name> [--project <name>] [--unmanaged]
//! pipelinectl namespace list [--json]
//! pipelinectl apply <namespace>/<name> -f <spec.yaml|spec.json>
//! pipelinectl delete <namespace>/<name>
//! pipelinectl get [-n <namespace>] [--json]
//! pipelinectl sync <namespace>/<name> | --all [--drop-ineligible]
//! pipelinectl jobs [--json]
//! pipelinectl hash -f <spec.yaml|spec.json>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    apply::ApplyArgs, delete::DeleteArgs, get::GetArgs, hash::HashArgs, jobs::JobsArgs,
    namespace::NamespaceCommand, run::RunArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pipelinectl",
    version,
    about = "Reconcile pipeline definitions against an external job service",
    long_about = None,
)]
struct Cli {
    /// Store root directory. Defaults to ~/.pipelinectl.
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller in the foreground until ctrl-c.
    Run(RunArgs),

    /// Manage namespaces in the local store.
    Namespace {
        #[command(subcommand)]
        command: NamespaceCommand,
    },

    /// Create or update a pipeline from a spec file.
    Apply(ApplyArgs),

    /// Request deletion of a pipeline.
    Delete(DeleteArgs),

    /// Show pipelines and their sync state.
    Get(GetArgs),

    /// Reconcile pipelines once, without the watch loop.
    Sync(SyncArgs),

    /// List job configs held by the local job service.
    Jobs(JobsArgs),

    /// Print the spec hash of a spec file.
    Hash(HashArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => pipeline_core::store::default_root()
            .context("could not determine home directory; pass --root")?,
    };

    match cli.command {
        Commands::Run(args) => args.run(&root),
        Commands::Namespace { command } => commands::namespace::run(&root, command),
        Commands::Apply(args) => args.run(&root),
        Commands::Delete(args) => args.run(&root),
        Commands::Get(args) => args.run(&root),
        Commands::Sync(args) => args.run(&root),
        Commands::Jobs(args) => args.run(&root),
        Commands::Hash(args) => args.run(),
    }
}
