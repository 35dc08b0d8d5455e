use anyhow::Context;
use clap::Subcommand;
use std::path::{Path, PathBuf};

use vpd_core::config::Config;
use vpd_core::policy::{best_action, DecisionSource, PolicyTable, StateKey, SynthesisContext};
use vpd_core::types::{estimate_leaf_temp, GrowStage, SensorReading};
use vpd_core::vpd::VpdPair;

use crate::output::print_json;

#[derive(Subcommand)]
pub enum PolicySubcommand {
    /// Show which action the learned policy picks for a reading
    Lookup {
        /// Air temperature in °C
        air: f64,
        /// Relative humidity in %
        humidity: f64,
        /// Leaf temperature in °C (default: air - 1.0)
        #[arg(long)]
        leaf: Option<f64>,
        /// Stage whose targets drive rule synthesis (default: configured stage)
        #[arg(long)]
        stage: Option<GrowStage>,
        /// Policy table file (default: policy.table or .vpd/policy.json)
        #[arg(long)]
        table: Option<PathBuf>,
    },
}

pub fn run(root: &Path, subcmd: PolicySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PolicySubcommand::Lookup {
            air,
            humidity,
            leaf,
            stage,
            table,
        } => lookup(root, air, humidity, leaf, stage, table, json),
    }
}

fn lookup(
    root: &Path,
    air: f64,
    humidity: f64,
    leaf: Option<f64>,
    stage: Option<GrowStage>,
    table: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    // Offline lookups work without an initialized root.
    let config = match Config::load(root) {
        Ok(c) => c,
        Err(vpd_core::VpdError::NotInitialized) => Config::default(),
        Err(e) => return Err(e).context("failed to load config"),
    };
    let stage = stage.unwrap_or(config.stage);
    let stage_cfg = config.stage_config(stage)?;

    let path = table.unwrap_or_else(|| config.policy_path(root));
    let policy = PolicyTable::load_or_empty(&path)
        .with_context(|| format!("failed to load policy table {}", path.display()))?;

    let leaf = leaf.unwrap_or_else(|| estimate_leaf_temp(air));
    let reading = SensorReading::live(air, leaf, humidity);
    let vpd = VpdPair::from_reading(&reading);
    let key = StateKey::from_observation(&reading, &vpd)
        .with_context(|| format!("reading cannot be discretized: {air} °C / {humidity} %"))?;

    let ctx = SynthesisContext::new(stage_cfg, &config.control);
    let decision = best_action(&key, &policy, &ctx, config.control.neighbor_tolerance);

    if json {
        print_json(&serde_json::json!({
            "stage": stage,
            "state": key.features(),
            "leaf_vpd": vpd.leaf_vpd,
            "table_entries": policy.len(),
            "action": decision.action,
            "source": decision.source,
        }))?;
        return Ok(());
    }

    let source = match decision.source {
        DecisionSource::Exact => "exact match".to_string(),
        DecisionSource::Neighbor { distance } => format!("nearest neighbor, distance {distance:.2}"),
        DecisionSource::Synthesized => "synthesized from stage targets".to_string(),
        DecisionSource::Default => "default".to_string(),
    };
    println!("state:   {key}");
    println!("action:  {}", decision.action);
    println!("source:  {source}");
    println!("table:   {} ({} states)", path.display(), policy.len());
    Ok(())
}
