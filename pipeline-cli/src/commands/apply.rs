//! `pipelinectl apply <namespace>/<name> -f <file>`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use pipeline_core::store;

use super::{parse_pipeline_key, read_spec};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Pipeline key, `<namespace>/<name>`.
    pub key: String,

    /// Spec file (YAML or JSON).
    #[arg(long = "file", short = 'f', value_name = "FILE")]
    pub file: PathBuf,
}

impl ApplyArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let key = parse_pipeline_key(&self.key)?;
        let spec = read_spec(&self.file)?;
        let namespace_exists = store::load_namespace_at(root, &key.namespace)
            .with_context(|| format!("failed to read namespace '{}'", key.namespace))?
            .is_some();

        let pipeline = store::apply_pipeline_at(root, &key, spec)
            .with_context(|| format!("failed to apply pipeline '{key}'"))?;

        println!(
            "✓ pipeline '{key}' applied (version {})",
            pipeline.metadata.resource_version
        );
        if !namespace_exists {
            println!(
                "  namespace '{}' does not exist yet; run `pipelinectl namespace create {}`",
                key.namespace, key.namespace
            );
        }
        Ok(())
    }
}
