//! Device collaborator interfaces and the bounded retry wrapper around them.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use vpd_core::config::DeviceConfig;
use vpd_core::types::{ActuatorKind, SensorReading};
use vpd_core::vpd::VpdPair;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device request timed out")]
    Timeout,

    #[error("transient device failure: {0}")]
    Transient(String),

    #[error("device rejected credentials: {0}")]
    Unauthorized(String),

    #[error("permanent device failure: {0}")]
    Permanent(String),
}

impl DeviceError {
    /// Fatal errors stop the control loop instead of being retried next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::Unauthorized(_) | DeviceError::Permanent(_))
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn read(&self) -> Result<SensorReading, DeviceError>;
}

#[async_trait]
pub trait Actuator: Send + Sync {
    async fn turn_on(&self) -> Result<(), DeviceError>;
    async fn turn_off(&self) -> Result<(), DeviceError>;
    async fn get_status(&self) -> Result<bool, DeviceError>;

    async fn set(&self, on: bool) -> Result<(), DeviceError> {
        if on {
            self.turn_on().await
        } else {
            self.turn_off().await
        }
    }
}

#[async_trait]
pub trait AnomalyDetector: Send + Sync {
    async fn is_anomalous(&self, reading: &SensorReading, vpd: &VpdPair) -> Result<bool, DeviceError>;
}

/// Detector used when anomaly gating is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAnomalyDetector;

#[async_trait]
impl AnomalyDetector for NoAnomalyDetector {
    async fn is_anomalous(&self, _: &SensorReading, _: &VpdPair) -> Result<bool, DeviceError> {
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// ActuatorRegistry
// ---------------------------------------------------------------------------

/// One concrete actuator per [`ActuatorKind`], fixed at startup.
#[derive(Clone)]
pub struct ActuatorRegistry {
    humidifier: Arc<dyn Actuator>,
    dehumidifier: Arc<dyn Actuator>,
    exhaust: Arc<dyn Actuator>,
}

impl ActuatorRegistry {
    pub fn new(
        humidifier: Arc<dyn Actuator>,
        dehumidifier: Arc<dyn Actuator>,
        exhaust: Arc<dyn Actuator>,
    ) -> Self {
        Self {
            humidifier,
            dehumidifier,
            exhaust,
        }
    }

    pub fn get(&self, kind: ActuatorKind) -> &Arc<dyn Actuator> {
        match kind {
            ActuatorKind::Humidifier => &self.humidifier,
            ActuatorKind::Dehumidifier => &self.dehumidifier,
            ActuatorKind::Exhaust => &self.exhaust,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &DeviceConfig) -> Self {
        Self {
            attempts: cfg.retry_attempts.max(1),
            delay: cfg.retry_delay(),
            timeout: cfg.timeout(),
        }
    }

    /// Run `op` up to `attempts` times, each bounded by `timeout`, sleeping
    /// `delay` between attempts. Fatal errors are returned immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, DeviceError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, DeviceError>> + Send,
    {
        let attempts = self.attempts.max(1);
        let mut last = DeviceError::Transient(format!("{what}: no attempt made"));
        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(DeviceError::Timeout),
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::debug!(what, attempt, attempts, error = %e, "device call failed");
                    last = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        Err(last)
    }
}
