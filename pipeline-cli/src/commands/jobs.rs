//! `pipelinectl jobs`: job configs held by the local job service.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use pipeline_sync::{spec_hash, DirJobConfigClient};

#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "job")]
    job: String,
    #[tabled(rename = "spec hash")]
    spec_hash: String,
}

impl JobsArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let configs = DirJobConfigClient::new(root)
            .list()
            .context("failed to list job configs")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&configs).context("failed to serialize job configs")?
            );
            return Ok(());
        }

        if configs.is_empty() {
            println!("No job configs.");
            return Ok(());
        }
        let rows: Vec<JobRow> = configs
            .iter()
            .map(|config| JobRow {
                job: format!("{}/{}", config.namespace, config.name),
                spec_hash: spec_hash::compute(&config.spec),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
