use clap::Subcommand;
use std::path::Path;

use vpd_core::types::ActuatorKind;

use crate::client::ApiClient;
use crate::output::{on_off, parse_on_off, print_json, print_table};

#[derive(Subcommand)]
pub enum OverrideSubcommand {
    /// Lock an actuator on or off until the override TTL expires
    Set {
        /// humidifier, dehumidifier or exhaust
        actuator: ActuatorKind,
        /// on or off
        state: String,
    },

    /// Remove an override
    Clear {
        actuator: ActuatorKind,
    },

    /// List active overrides
    List,
}

pub fn run(root: &Path, subcmd: OverrideSubcommand, json: bool) -> anyhow::Result<()> {
    let client = ApiClient::for_root(root)?;
    match subcmd {
        OverrideSubcommand::Set { actuator, state } => {
            let on = parse_on_off(&state)?;
            let resp = client.post(
                &format!("/api/overrides/{actuator}"),
                &serde_json::json!({ "state": on }),
            )?;
            if json {
                return print_json(&resp);
            }
            println!("Override set: {actuator} {}", on_off(on));
        }
        OverrideSubcommand::Clear { actuator } => {
            let resp = client.delete(&format!("/api/overrides/{actuator}"))?;
            if json {
                return print_json(&resp);
            }
            if resp["cleared"].as_bool().unwrap_or(false) {
                println!("Override cleared: {actuator}");
            } else {
                println!("No active override on {actuator}");
            }
        }
        OverrideSubcommand::List => {
            let resp = client.get("/api/overrides")?;
            if json {
                return print_json(&resp);
            }
            let list = resp["overrides"].as_array().cloned().unwrap_or_default();
            if list.is_empty() {
                println!("No active overrides.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = list
                .iter()
                .map(|o| {
                    vec![
                        o["actuator"].as_str().unwrap_or("?").to_string(),
                        on_off(o["desired_state"].as_bool().unwrap_or(false)).to_string(),
                        format!("{}s", o["remaining_secs"]),
                    ]
                })
                .collect();
            print_table(&["ACTUATOR", "STATE", "REMAINING"], &rows);
        }
    }
    Ok(())
}
