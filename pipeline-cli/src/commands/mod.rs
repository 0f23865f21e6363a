pub mod apply;
pub mod delete;
pub mod get;
pub mod hash;
pub mod jobs;
pub mod namespace;
pub mod run;
pub mod sync;

use std::path::Path;

use anyhow::{bail, Context, Result};

use pipeline_core::{ObjectKey, PipelineSpec};

/// Parse a `namespace/name` argument. Pipelines are always namespaced.
pub(crate) fn parse_pipeline_key(raw: &str) -> Result<ObjectKey> {
    let key: ObjectKey = raw
        .parse()
        .with_context(|| format!("invalid pipeline key '{raw}'"))?;
    if key.namespace.is_empty() || key.name.is_empty() {
        bail!("invalid pipeline key '{raw}': expected <namespace>/<name>");
    }
    Ok(key)
}

/// Read a spec from a YAML or JSON file.
pub(crate) fn read_spec(path: &Path) -> Result<PipelineSpec> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read spec file {}", path.display()))?;
    let value: serde_json::Value = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse spec file {}", path.display()))?;
    Ok(PipelineSpec(value))
}
