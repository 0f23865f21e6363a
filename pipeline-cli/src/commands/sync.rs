//! `pipelinectl sync`: reconcile once against the local job service.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use pipeline_core::store;
use pipeline_sync::{
    DirJobConfigClient, Event, EventRecorder, EventType, FileStore, IneligibleNamespacePolicy,
    SyncAction, SyncHandler,
};

use super::parse_pipeline_key;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Pipeline key, `<namespace>/<name>` (omit when using `--all`).
    pub key: Option<String>,

    /// Sync every pipeline in the store.
    #[arg(long, conflicts_with = "key")]
    pub all: bool,

    /// Skip pipelines in ineligible namespaces instead of failing.
    #[arg(long)]
    pub drop_ineligible: bool,
}

impl SyncArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let keys: Vec<String> = if self.all {
            store::list_pipelines_at(root)
                .context("failed to list pipelines")?
                .iter()
                .map(|p| p.key().to_string())
                .collect()
        } else {
            let raw = self.key.clone().context("provide a pipeline key or use --all")?;
            vec![parse_pipeline_key(&raw)?.to_string()]
        };

        if keys.is_empty() {
            println!("No pipelines. Run: pipelinectl apply <namespace>/<name> -f <file>");
            return Ok(());
        }

        let policy = if self.drop_ineligible {
            IneligibleNamespacePolicy::Drop
        } else {
            IneligibleNamespacePolicy::Retry
        };
        let file_store = Arc::new(FileStore::new(root));
        let handler = SyncHandler::new(
            file_store.clone(),
            file_store.clone(),
            Arc::new(DirJobConfigClient::new(root)),
            file_store,
            Arc::new(PrintRecorder),
        )
        .with_ineligible_policy(policy);

        let mut failed = 0usize;
        for key in &keys {
            match handler.sync(key) {
                Ok(outcome) => println!("✓ '{key}' {}", action_label(outcome.action)),
                Err(err) => {
                    failed += 1;
                    println!("{} '{key}': {err}", "✗".red().bold());
                }
            }
        }

        if failed > 0 {
            bail!("{failed} of {} pipeline(s) failed to sync", keys.len());
        }
        Ok(())
    }
}

fn action_label(action: SyncAction) -> &'static str {
    match action {
        SyncAction::InvalidKey => "skipped: invalid key",
        SyncAction::NamespaceGone => "skipped: namespace not found",
        SyncAction::NamespaceIneligible => "skipped: namespace not managed",
        SyncAction::PipelineGone => "skipped: pipeline not found",
        SyncAction::UpToDate => "up to date",
        SyncAction::Created => "created job config",
        SyncAction::Updated => "updated job config",
        SyncAction::Unchanged => "job config already matches",
        SyncAction::Finalized => "deleted job config and released finalizer",
        SyncAction::AlreadyFinalized => "already finalized",
    }
}

/// Prints handler events inline with the sync results.
struct PrintRecorder;

impl EventRecorder for PrintRecorder {
    fn record(&self, event: Event) {
        let reason = match event.event_type {
            EventType::Normal => event.reason.bright_black().to_string(),
            EventType::Warning => event.reason.yellow().to_string(),
        };
        println!("  {reason}  {}", event.message);
    }
}
