//! HTTP client for the device proxy that fronts the smart plugs and the
//! sensor hub.
//!
//! Endpoints: `GET /sensor_data`, `POST /{device}/on|off`,
//! `GET /device_state`, `POST /detect_anomaly`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use vpd_core::config::DeviceConfig;
use vpd_core::types::{estimate_leaf_temp, ActuatorKind, SensorReading};
use vpd_core::vpd::VpdPair;

use crate::controller::Devices;
use crate::device::{
    Actuator, ActuatorRegistry, AnomalyDetector, DeviceError, NoAnomalyDetector, SensorSource,
};

/// The sensor hub reports either a bare `[air, leaf, humidity]` triple or an
/// object; leaf temperature may be absent.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SensorPayload {
    Triple(f64, Option<f64>, f64),
    Object {
        temperature: f64,
        #[serde(default)]
        leaf_temperature: Option<f64>,
        humidity: f64,
    },
}

impl SensorPayload {
    fn into_reading(self) -> SensorReading {
        let (air, leaf, humidity) = match self {
            SensorPayload::Triple(a, l, h) => (a, l, h),
            SensorPayload::Object {
                temperature,
                leaf_temperature,
                humidity,
            } => (temperature, leaf_temperature, humidity),
        };
        let leaf = leaf.unwrap_or_else(|| estimate_leaf_temp(air));
        SensorReading::live(air, leaf, humidity)
    }
}

#[derive(Debug, Serialize)]
struct AnomalyRequest {
    temperature: f64,
    leaf_temperature: f64,
    humidity: f64,
    vpd_air: f64,
    vpd_leaf: f64,
}

#[derive(Debug, Deserialize)]
struct AnomalyResponse {
    #[serde(default)]
    anomaly_detected: bool,
}

fn classify(err: reqwest::Error) -> DeviceError {
    if err.is_timeout() {
        DeviceError::Timeout
    } else if err.is_decode() {
        DeviceError::Transient(format!("malformed response: {err}"))
    } else {
        DeviceError::Transient(err.to_string())
    }
}

fn check_status(status: StatusCode, what: &str) -> Result<(), DeviceError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(DeviceError::Unauthorized(format!("{what}: {status}")))
        }
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::BAD_REQUEST => {
            Err(DeviceError::Permanent(format!("{what}: {status}")))
        }
        _ => Err(DeviceError::Transient(format!("{what}: {status}"))),
    }
}

// ---------------------------------------------------------------------------
// HttpDeviceProxy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpDeviceProxy {
    client: reqwest::Client,
    base: String,
}

impl HttpDeviceProxy {
    pub fn new(base: impl Into<String>, cfg: &DeviceConfig) -> Result<Self, DeviceError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| DeviceError::Permanent(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &DeviceConfig) -> Result<Self, DeviceError> {
        Self::new(cfg.proxy_url.clone(), cfg)
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn switch(&self, kind: ActuatorKind, on: bool) -> Result<(), DeviceError> {
        let verb = if on { "on" } else { "off" };
        let path = format!("{kind}/{verb}");
        let resp = self
            .client
            .post(self.url(&path))
            .send()
            .await
            .map_err(classify)?;
        check_status(resp.status(), &path)
    }

    /// Device-reported on/off state keyed by actuator name.
    pub async fn device_state(&self) -> Result<HashMap<String, bool>, DeviceError> {
        let resp = self
            .client
            .get(self.url("device_state"))
            .send()
            .await
            .map_err(classify)?;
        check_status(resp.status(), "device_state")?;
        resp.json().await.map_err(classify)
    }

    /// Everything the controller needs, backed by this proxy. With anomaly
    /// gating disabled the detector endpoint is never called.
    pub fn devices(self: &Arc<Self>, anomaly_enabled: bool) -> Devices {
        let anomaly: Arc<dyn AnomalyDetector> = if anomaly_enabled {
            Arc::clone(self) as Arc<dyn AnomalyDetector>
        } else {
            Arc::new(NoAnomalyDetector)
        };
        Devices {
            sensors: Arc::clone(self) as Arc<dyn SensorSource>,
            actuators: self.registry(),
            anomaly,
        }
    }

    /// Wrap this proxy as one actuator per kind.
    pub fn registry(self: &Arc<Self>) -> ActuatorRegistry {
        let make = |kind| -> Arc<dyn Actuator> {
            Arc::new(HttpActuator {
                proxy: Arc::clone(self),
                kind,
            })
        };
        ActuatorRegistry::new(
            make(ActuatorKind::Humidifier),
            make(ActuatorKind::Dehumidifier),
            make(ActuatorKind::Exhaust),
        )
    }
}

#[async_trait]
impl SensorSource for HttpDeviceProxy {
    async fn read(&self) -> Result<SensorReading, DeviceError> {
        let resp = self
            .client
            .get(self.url("sensor_data"))
            .send()
            .await
            .map_err(classify)?;
        check_status(resp.status(), "sensor_data")?;
        let payload: SensorPayload = resp.json().await.map_err(classify)?;
        Ok(payload.into_reading())
    }
}

#[async_trait]
impl AnomalyDetector for HttpDeviceProxy {
    async fn is_anomalous(&self, reading: &SensorReading, vpd: &VpdPair) -> Result<bool, DeviceError> {
        let body = AnomalyRequest {
            temperature: reading.air_temp,
            leaf_temperature: reading.leaf_temp,
            humidity: reading.humidity,
            vpd_air: vpd.air_vpd,
            vpd_leaf: vpd.leaf_vpd,
        };
        let resp = self
            .client
            .post(self.url("detect_anomaly"))
            .json(&body)
            .send()
            .await
            .map_err(classify)?;
        check_status(resp.status(), "detect_anomaly")?;
        let parsed: AnomalyResponse = resp.json().await.map_err(classify)?;
        Ok(parsed.anomaly_detected)
    }
}

// ---------------------------------------------------------------------------
// HttpActuator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpActuator {
    proxy: Arc<HttpDeviceProxy>,
    kind: ActuatorKind,
}

#[async_trait]
impl Actuator for HttpActuator {
    async fn turn_on(&self) -> Result<(), DeviceError> {
        self.proxy.switch(self.kind, true).await
    }

    async fn turn_off(&self) -> Result<(), DeviceError> {
        self.proxy.switch(self.kind, false).await
    }

    async fn get_status(&self) -> Result<bool, DeviceError> {
        let states = self.proxy.device_state().await?;
        states
            .get(self.kind.as_str())
            .copied()
            .ok_or_else(|| DeviceError::Transient(format!("device_state has no '{}'", self.kind)))
    }
}
