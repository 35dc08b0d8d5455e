use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::air_exchange::AirExchangeWindow;
use crate::error::Result;
use crate::paths;
use crate::types::{ActuatorState, GrowStage};

/// What the controller persists between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub stage: GrowStage,
    #[serde(default)]
    pub actuators: ActuatorState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exchange_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl ControllerState {
    pub fn new(stage: GrowStage) -> Self {
        Self {
            stage,
            actuators: ActuatorState::all_off(),
            last_exchange_at: None,
            last_updated: Utc::now(),
        }
    }

    /// Load the state file, or a fresh state for `stage` when none exists.
    pub fn load_or_default(root: &Path, stage: GrowStage) -> Result<Self> {
        let path = paths::state_path(root);
        if !path.exists() {
            return Ok(Self::new(stage));
        }
        let data = std::fs::read_to_string(&path)?;
        let state: ControllerState = serde_yaml::from_str(&data)?;
        Ok(state)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::state_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// The persisted window, or one starting at `now`.
    pub fn window_or(&self, now: DateTime<Utc>) -> AirExchangeWindow {
        AirExchangeWindow::starting_at(self.last_exchange_at.unwrap_or(now))
    }

    pub fn record(
        &mut self,
        actuators: ActuatorState,
        window: AirExchangeWindow,
        now: DateTime<Utc>,
    ) {
        self.actuators = actuators;
        self.last_exchange_at = Some(window.last_exchange_at);
        self.last_updated = now;
    }

    pub fn set_stage(&mut self, stage: GrowStage, now: DateTime<Utc>) {
        self.stage = stage;
        self.last_updated = now;
    }
}
