use serde_json::Value;
use std::path::Path;

use crate::client::ApiClient;
use crate::output::{on_off, print_json, print_table};

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let status = ApiClient::for_root(root)?.get("/api/status")?;
    if json {
        return print_json(&status);
    }

    println!(
        "stage:    {} (VPD {}-{} kPa, RH ≤ {} %)",
        text(&status["stage"]),
        status["band"]["vpd_min"],
        status["band"]["vpd_max"],
        status["band"]["max_humidity"],
    );
    match status["reading"].as_object() {
        Some(r) => println!(
            "reading:  {} °C air, {} °C leaf, {} % RH ({})",
            r["air_temp"],
            r["leaf_temp"],
            r["humidity"],
            text(&r["source"]),
        ),
        None => println!("reading:  none yet"),
    }
    if let Some(v) = status["vpd"].as_object() {
        println!(
            "vpd:      {} kPa leaf, {} kPa air ({})",
            v["leaf_vpd"],
            v["air_vpd"],
            text(&status["zone"]),
        );
    }
    let fallbacks = status["consecutive_fallbacks"].as_u64().unwrap_or(0);
    if fallbacks > 0 {
        println!("warning:  {fallbacks} consecutive fallback readings");
    }
    if status["venting"].as_bool().unwrap_or(false) {
        println!("air exchange in progress");
    } else {
        println!(
            "next air exchange in {}s",
            status["next_air_exchange_secs"].as_u64().unwrap_or(0)
        );
    }
    println!();

    let reasons = &status["last_decision"]["reasons"];
    let overrides = status["overrides"].as_array().cloned().unwrap_or_default();
    let rows: Vec<Vec<String>> = ["humidifier", "dehumidifier", "exhaust"]
        .iter()
        .map(|name| {
            let on = status["actuators"][*name].as_bool().unwrap_or(false);
            let lock = overrides
                .iter()
                .find(|o| o["actuator"] == *name)
                .map(|o| format!("{}s left", o["remaining_secs"]))
                .unwrap_or_default();
            vec![
                name.to_string(),
                on_off(on).to_string(),
                text(&reasons[*name]),
                lock,
            ]
        })
        .collect();
    print_table(&["ACTUATOR", "STATE", "REASON", "OVERRIDE"], &rows);
    Ok(())
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
