//! `pipelinectl delete <namespace>/<name>`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use pipeline_core::store::{self, DeleteOutcome};

use super::parse_pipeline_key;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Pipeline key, `<namespace>/<name>`.
    pub key: String,
}

impl DeleteArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let key = parse_pipeline_key(&self.key)?;
        match store::delete_pipeline_at(root, &key)
            .with_context(|| format!("failed to delete pipeline '{key}'"))?
        {
            DeleteOutcome::Removed => println!("✓ pipeline '{key}' deleted"),
            DeleteOutcome::MarkedForDeletion { finalizers } => {
                println!("✓ pipeline '{key}' marked for deletion");
                println!("  waiting on finalizers: {}", finalizers.join(", "));
            }
        }
        Ok(())
    }
}
