use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Result, VpdError};
use crate::types::GrowStage;

pub const DEFAULT_MIN_HUMIDITY: f64 = 40.0;
pub const DEFAULT_MAX_AIR_TEMP: f64 = 26.0;

/// Target ranges for one grow stage. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub vpd_min: f64,
    pub vpd_max: f64,
    pub max_humidity: f64,
    #[serde(default = "default_min_humidity")]
    pub min_humidity: f64,
    /// Safety ceiling for the exhaust; falls back to `control.max_air_temp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_air_temp: Option<f64>,
    pub air_exchange_interval_secs: u64,
    pub air_exchange_duration_secs: u64,
}

fn default_min_humidity() -> f64 {
    DEFAULT_MIN_HUMIDITY
}

impl StageConfig {
    pub fn midpoint(&self) -> f64 {
        (self.vpd_min + self.vpd_max) / 2.0
    }

    pub fn air_exchange_interval(&self) -> Duration {
        Duration::from_secs(self.air_exchange_interval_secs)
    }

    pub fn air_exchange_duration(&self) -> Duration {
        Duration::from_secs(self.air_exchange_duration_secs)
    }

    pub fn max_air_temp_or(&self, default: f64) -> f64 {
        self.max_air_temp.unwrap_or(default)
    }

    pub fn in_band(&self, leaf_vpd: f64) -> bool {
        leaf_vpd >= self.vpd_min && leaf_vpd <= self.vpd_max
    }

    /// Reject tables the engine cannot act on sensibly.
    pub fn check(&self, stage: &str) -> Result<()> {
        let invalid = |reason: &str| VpdError::InvalidStageConfig {
            stage: stage.to_string(),
            reason: reason.to_string(),
        };
        if !(self.vpd_min.is_finite() && self.vpd_max.is_finite()) {
            return Err(invalid("vpd band must be finite"));
        }
        if self.vpd_min > self.vpd_max {
            return Err(invalid("vpd_min is greater than vpd_max"));
        }
        if !(0.0..=100.0).contains(&self.max_humidity) {
            return Err(invalid("max_humidity must be within 0..=100"));
        }
        if self.min_humidity > self.max_humidity {
            return Err(invalid("min_humidity is greater than max_humidity"));
        }
        if self.air_exchange_interval_secs == 0 {
            return Err(invalid("air_exchange_interval_secs must be positive"));
        }
        Ok(())
    }
}

/// The built-in stage table.
pub fn default_stages() -> BTreeMap<GrowStage, StageConfig> {
    let mut stages = BTreeMap::new();
    stages.insert(
        GrowStage::Propagation,
        StageConfig {
            vpd_min: 0.4,
            vpd_max: 0.8,
            max_humidity: 70.0,
            min_humidity: DEFAULT_MIN_HUMIDITY,
            max_air_temp: None,
            air_exchange_interval_secs: 45 * 60,
            air_exchange_duration_secs: 2 * 60,
        },
    );
    stages.insert(
        GrowStage::Vegetative,
        StageConfig {
            vpd_min: 0.8,
            vpd_max: 1.2,
            max_humidity: 60.0,
            min_humidity: DEFAULT_MIN_HUMIDITY,
            max_air_temp: None,
            air_exchange_interval_secs: 30 * 60,
            air_exchange_duration_secs: 4 * 60,
        },
    );
    stages.insert(
        GrowStage::Flowering,
        StageConfig {
            vpd_min: 1.2,
            vpd_max: 1.6,
            max_humidity: 55.0,
            min_humidity: DEFAULT_MIN_HUMIDITY,
            max_air_temp: None,
            air_exchange_interval_secs: 20 * 60,
            air_exchange_duration_secs: 6 * 60,
        },
    );
    stages
}

/// Look up a stage, failing if the table has no entry for it.
pub fn lookup(
    stages: &BTreeMap<GrowStage, StageConfig>,
    stage: GrowStage,
) -> Result<&StageConfig> {
    stages
        .get(&stage)
        .ok_or_else(|| VpdError::StageNotConfigured(stage.to_string()))
}
