use crate::error::{Result, VpdError};
use crate::paths;
use crate::stage::{self, StageConfig, DEFAULT_MAX_AIR_TEMP};
use crate::types::{
    GrowStage, ReadingSource, SensorReading, FALLBACK_AIR_TEMP, FALLBACK_HUMIDITY,
    FALLBACK_LEAF_TEMP,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ControlConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    /// Margin around the VPD band before rule-based correction kicks in.
    #[serde(default = "default_kpa_tolerance")]
    pub kpa_tolerance: f64,
    #[serde(default = "default_humidity_buffer")]
    pub humidity_buffer: f64,
    #[serde(default = "default_max_air_temp")]
    pub max_air_temp: f64,
    #[serde(default = "default_override_ttl")]
    pub override_ttl_secs: u64,
    /// Maximum Euclidean distance for a nearest-neighbor policy match.
    #[serde(default = "default_neighbor_tolerance")]
    pub neighbor_tolerance: f64,
}

fn default_cycle_interval() -> u64 {
    5
}

fn default_kpa_tolerance() -> f64 {
    0.1
}

fn default_humidity_buffer() -> f64 {
    5.0
}

fn default_max_air_temp() -> f64 {
    DEFAULT_MAX_AIR_TEMP
}

fn default_override_ttl() -> u64 {
    3000
}

fn default_neighbor_tolerance() -> f64 {
    1.0
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval(),
            kpa_tolerance: default_kpa_tolerance(),
            humidity_buffer: default_humidity_buffer(),
            max_air_temp: default_max_air_temp(),
            override_ttl_secs: default_override_ttl(),
            neighbor_tolerance: default_neighbor_tolerance(),
        }
    }
}

impl ControlConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn override_ttl(&self) -> Duration {
        Duration::from_secs(self.override_ttl_secs)
    }
}

// ---------------------------------------------------------------------------
// AnomalyConfig
// ---------------------------------------------------------------------------

/// What to do when the anomaly predicate itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyFailurePolicy {
    /// Treat the failure as an anomaly and skip actuation.
    #[default]
    FailClosed,
    /// Ignore the failure and actuate.
    FailOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub on_error: AnomalyFailurePolicy,
}

fn default_true() -> bool {
    true
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_error: AnomalyFailurePolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackReading {
    pub air_temp: f64,
    pub leaf_temp: f64,
    pub humidity: f64,
}

impl Default for FallbackReading {
    fn default() -> Self {
        Self {
            air_temp: FALLBACK_AIR_TEMP,
            leaf_temp: FALLBACK_LEAF_TEMP,
            humidity: FALLBACK_HUMIDITY,
        }
    }
}

impl FallbackReading {
    pub fn to_reading(self) -> SensorReading {
        SensorReading {
            air_temp: self.air_temp,
            leaf_temp: self.leaf_temp,
            humidity: self.humidity,
            source: ReadingSource::Fallback,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub fallback: FallbackReading,
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            fallback: FallbackReading::default(),
        }
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// PolicyConfig / ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Policy table path; relative paths resolve against the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7070
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.bind, self.port)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub stage: GrowStage,
    #[serde(default = "stage::default_stages")]
    pub stages: BTreeMap<GrowStage, StageConfig>,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            stage: GrowStage::default(),
            stages: stage::default_stages(),
            control: ControlConfig::default(),
            anomaly: AnomalyConfig::default(),
            devices: DeviceConfig::default(),
            policy: PolicyConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(VpdError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn stage_config(&self, stage: GrowStage) -> Result<&StageConfig> {
        stage::lookup(&self.stages, stage)
    }

    pub fn policy_path(&self, root: &Path) -> PathBuf {
        paths::policy_path(root, self.policy.table.as_deref())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };
        let warning = |message: String| ConfigWarning {
            level: WarnLevel::Warning,
            message,
        };

        if !self.stages.contains_key(&self.stage) {
            warnings.push(error(format!(
                "active stage '{}' has no entry in stages",
                self.stage
            )));
        }

        for (name, cfg) in &self.stages {
            if cfg.vpd_min > cfg.vpd_max {
                warnings.push(error(format!(
                    "stage '{name}': vpd_min {} is greater than vpd_max {}",
                    cfg.vpd_min, cfg.vpd_max
                )));
            }
            if cfg.min_humidity > cfg.max_humidity {
                warnings.push(error(format!(
                    "stage '{name}': min_humidity {} is above max_humidity {}",
                    cfg.min_humidity, cfg.max_humidity
                )));
            }
            if cfg.max_humidity - self.control.humidity_buffer < cfg.min_humidity {
                warnings.push(warning(format!(
                    "stage '{name}': humidity buffer reaches below min_humidity {}",
                    cfg.min_humidity
                )));
            }
            if cfg.air_exchange_interval_secs == 0 {
                warnings.push(error(format!(
                    "stage '{name}': air_exchange_interval_secs must be positive"
                )));
            } else if cfg.air_exchange_duration_secs >= cfg.air_exchange_interval_secs {
                warnings.push(warning(format!(
                    "stage '{name}': air exchange duration {}s is not shorter than interval {}s",
                    cfg.air_exchange_duration_secs, cfg.air_exchange_interval_secs
                )));
            }
        }

        if self.control.kpa_tolerance <= 0.0 {
            warnings.push(error(format!(
                "control.kpa_tolerance must be positive (got {})",
                self.control.kpa_tolerance
            )));
        }
        if self.control.humidity_buffer < 0.0 {
            warnings.push(error(format!(
                "control.humidity_buffer must not be negative (got {})",
                self.control.humidity_buffer
            )));
        }
        if self.control.neighbor_tolerance <= 0.0 {
            warnings.push(warning(format!(
                "control.neighbor_tolerance={} disables nearest-neighbor policy matches",
                self.control.neighbor_tolerance
            )));
        }
        if self.control.cycle_interval_secs == 0 {
            warnings.push(error(
                "control.cycle_interval_secs must be positive".to_string(),
            ));
        }
        if self.devices.retry_attempts == 0 {
            warnings.push(error(
                "devices.retry_attempts must be at least 1".to_string(),
            ));
        } else if self.devices.retry_attempts > 10 {
            warnings.push(warning(format!(
                "devices.retry_attempts={} (>10 is unusual)",
                self.devices.retry_attempts
            )));
        }
        if !self.devices.proxy_url.starts_with("http://")
            && !self.devices.proxy_url.starts_with("https://")
        {
            warnings.push(error(format!(
                "devices.proxy_url '{}' is not an http(s) URL",
                self.devices.proxy_url
            )));
        }

        warnings
    }

    pub fn has_errors(warnings: &[ConfigWarning]) -> bool {
        warnings.iter().any(|w| w.level == WarnLevel::Error)
    }
}
