//! `pipelinectl run`: the controller in the foreground.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use pipeline_controller::{start_blocking, ControllerConfig, LogFormat};
use pipeline_sync::IneligibleNamespacePolicy;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of concurrent workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Controller config file. Defaults to <root>/controller.yaml.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log output format: text | json.
    #[arg(long, value_name = "FORMAT", value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    /// Seconds between full relists of the store; 0 disables.
    #[arg(long, value_name = "SECS")]
    pub resync_secs: Option<u64>,

    /// Drop keys in ineligible namespaces instead of retrying them.
    #[arg(long)]
    pub drop_ineligible: bool,
}

impl RunArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let config = self.config(root)?;
        start_blocking(root, config).context("controller exited with error")?;
        Ok(())
    }

    fn config(&self, root: &Path) -> Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::load_from(path),
            None => ControllerConfig::load_at(root),
        }
        .context("failed to load controller config")?;

        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(secs) = self.resync_secs {
            config.resync_interval_secs = secs;
        }
        if self.drop_ineligible {
            config.ineligible_namespace_policy = IneligibleNamespacePolicy::Drop;
        }
        Ok(config)
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s.to_ascii_lowercase().as_str() {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format '{other}'; expected: text, json")),
    }
}
