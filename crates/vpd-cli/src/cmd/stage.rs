use clap::Subcommand;
use std::path::Path;

use vpd_core::types::GrowStage;

use crate::client::ApiClient;
use crate::output::print_json;

#[derive(Subcommand)]
pub enum StageSubcommand {
    /// Switch the running controller to another grow stage
    Set {
        /// propagation, vegetative or flowering
        stage: GrowStage,
    },
}

pub fn run(root: &Path, subcmd: StageSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StageSubcommand::Set { stage } => {
            let resp = ApiClient::for_root(root)?
                .put("/api/stage", &serde_json::json!({ "stage": stage }))?;
            if json {
                return print_json(&resp);
            }
            println!(
                "Stage: {} -> {}",
                resp["previous"].as_str().unwrap_or("?"),
                stage
            );
        }
    }
    Ok(())
}
