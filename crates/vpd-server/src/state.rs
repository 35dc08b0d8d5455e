use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch};

use vpd_core::air_exchange::AirExchangeWindow;
use vpd_core::config::Config;
use vpd_core::engine::Decision;
use vpd_core::overrides::OverrideTracker;
use vpd_core::policy::PolicyTable;
use vpd_core::types::{ActuatorState, GrowStage, SensorReading};
use vpd_core::vpd::{VpdPair, VpdZone};

use crate::clock::Clock;

// ---------------------------------------------------------------------------
// PolicyHandle
// ---------------------------------------------------------------------------

/// The active policy table, swappable as a whole.
#[derive(Clone, Default)]
pub struct PolicyHandle {
    inner: Arc<RwLock<Arc<PolicyTable>>>,
}

impl PolicyHandle {
    pub fn new(table: PolicyTable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    pub fn current(&self) -> Arc<PolicyTable> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn swap(&self, table: PolicyTable) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(table);
    }
}

// ---------------------------------------------------------------------------
// ControllerStatus
// ---------------------------------------------------------------------------

/// Snapshot published by the control loop after every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub stage: GrowStage,
    pub actuators: ActuatorState,
    pub window: AirExchangeWindow,
    pub venting: bool,
    pub reading: Option<SensorReading>,
    pub vpd: Option<VpdPair>,
    pub zone: Option<VpdZone>,
    pub consecutive_fallbacks: u32,
    pub last_decision: Option<Decision>,
    pub cycles: u64,
    pub updated_at: DateTime<Utc>,
}

impl ControllerStatus {
    pub fn initial(stage: GrowStage, actuators: ActuatorState, window: AirExchangeWindow, now: DateTime<Utc>) -> Self {
        Self {
            stage,
            actuators,
            window,
            venting: false,
            reading: None,
            vpd: None,
            zone: None,
            consecutive_fallbacks: 0,
            last_decision: None,
            cycles: 0,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared handles passed to route handlers and the controller.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub overrides: Arc<OverrideTracker>,
    pub policy: PolicyHandle,
    pub stage: Arc<watch::Sender<GrowStage>>,
    pub status: Arc<watch::Sender<ControllerStatus>>,
    pub clock: Clock,
    pub event_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(root: PathBuf, config: Config, policy: PolicyTable, stage: GrowStage) -> Self {
        Self::with_clock(root, config, policy, stage, Clock::new())
    }

    pub fn with_clock(
        root: PathBuf,
        config: Config,
        policy: PolicyTable,
        stage: GrowStage,
        clock: Clock,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let now = clock.now();
        let status = ControllerStatus::initial(
            stage,
            ActuatorState::all_off(),
            AirExchangeWindow::starting_at(now),
            now,
        );
        let (stage_tx, _) = watch::channel(stage);
        let (status_tx, _) = watch::channel(status);
        Self {
            root,
            overrides: Arc::new(OverrideTracker::new(config.control.override_ttl())),
            config: Arc::new(config),
            policy: PolicyHandle::new(policy),
            stage: Arc::new(stage_tx),
            status: Arc::new(status_tx),
            clock,
            event_tx,
        }
    }

    pub fn active_stage(&self) -> GrowStage {
        *self.stage.borrow()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn notify(&self) {
        let _ = self.event_tx.send(());
    }
}
