use anyhow::Context;
use std::path::Path;

use vpd_core::config::Config;
use vpd_core::state::ControllerState;
use vpd_core::{io, paths};

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing VPD controller in: {}", root.display());

    let dir = paths::vpd_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    let stage = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load existing config")?.stage
    } else {
        let cfg = Config::default();
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg.stage
    };

    let state_path = paths::state_path(root);
    if state_path.exists() {
        println!("  exists:  {}", paths::STATE_FILE);
    } else {
        ControllerState::new(stage)
            .save(root)
            .context("failed to write state.yaml")?;
        println!("  created: {}", paths::STATE_FILE);
    }

    println!("\nEdit {} then start the loop with `vpdctl run`.", paths::CONFIG_FILE);
    Ok(())
}
