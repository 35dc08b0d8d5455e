use anyhow::Context;
use std::path::Path;

use vpd_core::config::Config;

use crate::output::{print_json, print_table};

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;

    if json {
        print_json(&serde_json::json!({
            "active": config.stage,
            "stages": config.stages,
        }))?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = config
        .stages
        .iter()
        .map(|(stage, cfg)| {
            let marker = if *stage == config.stage { "*" } else { "" };
            vec![
                format!("{stage}{marker}"),
                format!("{:.2}-{:.2}", cfg.vpd_min, cfg.vpd_max),
                format!("{:.0}-{:.0}", cfg.min_humidity, cfg.max_humidity),
                format!("{:.1}", cfg.max_air_temp_or(config.control.max_air_temp)),
                format!(
                    "{}m / {}m",
                    cfg.air_exchange_interval_secs / 60,
                    cfg.air_exchange_duration_secs / 60
                ),
            ]
        })
        .collect();
    print_table(
        &["STAGE", "VPD (kPa)", "RH (%)", "MAX °C", "AIR EXCHANGE"],
        &rows,
    );
    Ok(())
}
