use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const VPD_DIR: &str = ".vpd";

pub const CONFIG_FILE: &str = ".vpd/config.yaml";
pub const STATE_FILE: &str = ".vpd/state.yaml";
pub const POLICY_FILE: &str = ".vpd/policy.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn vpd_dir(root: &Path) -> PathBuf {
    root.join(VPD_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

/// Resolve a policy table path from config: relative paths are taken
/// against the project root.
pub fn policy_path(root: &Path, configured: Option<&Path>) -> PathBuf {
    match configured {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => root.join(p),
        None => root.join(POLICY_FILE),
    }
}
