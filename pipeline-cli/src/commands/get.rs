//! `pipelinectl get`: pipelines and their sync state.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use pipeline_core::{
    store, Pipeline, PIPELINE_FINALIZER, SPEC_HASH_ANNOTATION, SYNC_STATUS_ANNOTATION,
    SYNC_STATUS_SUCCESSFUL,
};
use pipeline_sync::spec_hash;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Only show pipelines in this namespace.
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl GetArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let mut pipelines = store::list_pipelines_at(root).context("failed to list pipelines")?;
        if let Some(namespace) = self.namespace.as_ref() {
            pipelines.retain(|p| p.metadata.namespace == *namespace);
        }
        let rows: Vec<PipelineStatus> = pipelines.iter().map(PipelineStatus::of).collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize pipelines")?
            );
            return Ok(());
        }
        print_table(rows);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SyncState {
    Pending,
    Synced,
    OutOfDate,
    Deleting,
}

#[derive(Debug, Serialize)]
struct PipelineStatus {
    namespace: String,
    name: String,
    version: String,
    state: SyncState,
    spec_hash: String,
    synced_hash: Option<String>,
    finalized: bool,
    deletion_timestamp: Option<DateTime<Utc>>,
}

impl PipelineStatus {
    fn of(pipeline: &Pipeline) -> Self {
        let current = spec_hash::compute(&pipeline.spec);
        let synced_hash = pipeline.annotation(SPEC_HASH_ANNOTATION).map(str::to_string);
        let successful = pipeline.annotation(SYNC_STATUS_ANNOTATION) == Some(SYNC_STATUS_SUCCESSFUL);

        let state = if pipeline.is_deleting() {
            SyncState::Deleting
        } else if !successful {
            SyncState::Pending
        } else if synced_hash.as_deref() == Some(current.as_str()) {
            SyncState::Synced
        } else {
            SyncState::OutOfDate
        };

        Self {
            namespace: pipeline.metadata.namespace.clone(),
            name: pipeline.metadata.name.clone(),
            version: pipeline.metadata.resource_version.clone(),
            state,
            spec_hash: current,
            synced_hash,
            finalized: pipeline.has_finalizer(PIPELINE_FINALIZER),
            deletion_timestamp: pipeline.metadata.deletion_timestamp,
        }
    }
}

#[derive(Tabled)]
struct PipelineRow {
    #[tabled(rename = "pipeline")]
    pipeline: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "spec hash")]
    spec_hash: String,
    #[tabled(rename = "finalizer")]
    finalizer: String,
    #[tabled(rename = "version")]
    version: String,
}

fn print_table(rows: Vec<PipelineStatus>) {
    if rows.is_empty() {
        println!("No pipelines. Run: pipelinectl apply <namespace>/<name> -f <file>");
        return;
    }

    let pending = rows
        .iter()
        .filter(|r| matches!(r.state, SyncState::Pending | SyncState::OutOfDate))
        .count();

    let table_rows: Vec<PipelineRow> = rows
        .into_iter()
        .map(|row| PipelineRow {
            pipeline: format!("{}/{}", row.namespace, row.name),
            state: state_label(row.state, row.deletion_timestamp),
            spec_hash: row.spec_hash,
            finalizer: if row.finalized { "✓" } else { "-" }.to_string(),
            version: row.version,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if pending > 0 {
        println!("{pending} pipeline(s) waiting for the controller. Run 'pipelinectl sync --all' to reconcile now.");
    }
}

fn state_label(state: SyncState, deleted_at: Option<DateTime<Utc>>) -> String {
    match state {
        SyncState::Synced => "SYNCED".green().bold().to_string(),
        SyncState::Pending => "PENDING".bright_black().bold().to_string(),
        SyncState::OutOfDate => "OUT OF DATE".yellow().bold().to_string(),
        SyncState::Deleting => {
            let age = deleted_at.map(format_age).unwrap_or_default();
            format!("{} {age}", "DELETING".red().bold()).trim_end().to_string()
        }
    }
}

fn format_age(since: DateTime<Utc>) -> String {
    let secs = (Utc::now() - since).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86_399 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86_400),
    }
}
