use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "controller.yaml";

/// `<root>/controller.yaml`
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}
