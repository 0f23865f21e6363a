//! `pipelinectl hash -f <file>`

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use pipeline_sync::spec_hash;

use super::read_spec;

#[derive(Args, Debug)]
pub struct HashArgs {
    /// Spec file (YAML or JSON).
    #[arg(long = "file", short = 'f', value_name = "FILE")]
    pub file: PathBuf,
}

impl HashArgs {
    pub fn run(self) -> Result<()> {
        let spec = read_spec(&self.file)?;
        println!("{}", spec_hash::compute(&spec));
        Ok(())
    }
}
