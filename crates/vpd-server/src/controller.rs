//! The control loop: one sensor read, one arbitration and at most one
//! command per actuator every cycle.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use vpd_core::air_exchange::{self, AirExchangeWindow};
use vpd_core::config::AnomalyFailurePolicy;
use vpd_core::engine::{Arbiter, CycleInput, Decision, SkipReason};
use vpd_core::stage::StageConfig;
use vpd_core::state::ControllerState;
use vpd_core::types::{ActuatorKind, Command, SensorReading};
use vpd_core::vpd::{VpdPair, VpdZone};

use crate::device::{ActuatorRegistry, AnomalyDetector, DeviceError, RetryPolicy, SensorSource};
use crate::error::ControlError;
use crate::state::{AppState, ControllerStatus};

/// The device collaborators one controller drives.
#[derive(Clone)]
pub struct Devices {
    pub sensors: Arc<dyn SensorSource>,
    pub actuators: ActuatorRegistry,
    pub anomaly: Arc<dyn AnomalyDetector>,
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Actuated { sent: usize, failed: usize },
    Skipped(SkipReason),
    Vented { interrupted: bool },
    VentDeferred,
    VentFailed,
}

pub struct Controller {
    app: AppState,
    devices: Devices,
    retry: RetryPolicy,
    state: ControllerState,
    window: AirExchangeWindow,
    status: ControllerStatus,
    /// Set when the shutoff that ends an air exchange failed.
    pending_exhaust_off: bool,
}

impl Controller {
    pub fn new(app: AppState, devices: Devices, state: ControllerState) -> Self {
        let now = app.now();
        let window = state.window_or(now);
        let retry = RetryPolicy::from_config(&app.config.devices);
        app.stage.send_replace(state.stage);
        let status = ControllerStatus::initial(state.stage, state.actuators, window, now);
        Self {
            app,
            devices,
            retry,
            state,
            window,
            status,
            pending_exhaust_off: false,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn window(&self) -> AirExchangeWindow {
        self.window
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Run until `shutdown` flips to true or a fatal device error occurs.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ControlError> {
        let interval = self.app.config.control.cycle_interval();
        tracing::info!(
            stage = %self.state.stage,
            interval_secs = interval.as_secs(),
            "controller started"
        );

        if let Err(e) = self.sync_from_devices().await {
            tracing::error!(error = %e, "startup sync failed");
            return Err(e);
        }
        self.publish();

        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.run_cycle(&mut shutdown).await {
                tracing::error!(error = %e, "control loop stopped");
                self.persist();
                return Err(e);
            }
            if sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }

        self.persist();
        tracing::info!("controller stopped");
        Ok(())
    }

    /// Adopt the device-reported state; keep the persisted one on failure.
    pub async fn sync_from_devices(&mut self) -> Result<(), ControlError> {
        for kind in ActuatorKind::all() {
            let actuator = Arc::clone(self.devices.actuators.get(*kind));
            let actuator = &actuator;
            match self.retry.run("get_status", move || actuator.get_status()).await {
                Ok(on) => {
                    if on != self.state.actuators.get(*kind) {
                        tracing::info!(actuator = %kind, on, "adopting device-reported state");
                    }
                    self.state.actuators.set(*kind, on);
                }
                Err(e) if e.is_fatal() => {
                    return Err(ControlError::Device {
                        what: format!("{kind} status"),
                        source: e,
                    })
                }
                Err(e) => {
                    tracing::warn!(actuator = %kind, error = %e, "status unavailable, keeping persisted state");
                }
            }
        }
        self.status.actuators = self.state.actuators;
        Ok(())
    }

    pub async fn run_cycle(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, ControlError> {
        let now = self.app.now();
        let mut dirty = false;

        let stage = self.app.active_stage();
        if stage != self.state.stage {
            tracing::info!(from = %self.state.stage, to = %stage, "grow stage changed");
            self.state.set_stage(stage, now);
            self.status.stage = stage;
            dirty = true;
        }
        let stage_cfg = self.app.config.stage_config(stage)?.clone();

        let reading = self.read_sensors().await?;
        let vpd = VpdPair::from_reading(&reading);
        self.status.reading = Some(reading);
        self.status.vpd = Some(vpd);
        self.status.zone = vpd.is_usable().then(|| VpdZone::classify(vpd.leaf_vpd));
        self.status.cycles += 1;

        if self.check_anomaly(&reading, &vpd).await? {
            let decision = Decision::skip(self.state.actuators, SkipReason::Anomaly);
            tracing::warn!("anomaly reported, skipping actuation");
            self.finish_cycle(Some(decision), dirty);
            return Ok(CycleOutcome::Skipped(SkipReason::Anomaly));
        }

        let (due, _) = air_exchange::should_vent(now, &self.window, &stage_cfg);
        if due {
            if self.app.overrides.desired(ActuatorKind::Exhaust, now) == Some(false) {
                tracing::debug!("air exchange due but exhaust is overridden off, deferring");
                self.finish_cycle(None, dirty);
                return Ok(CycleOutcome::VentDeferred);
            }
            return self.vent(&stage_cfg, shutdown).await;
        }

        let policy = self.app.policy.current();
        let arbiter = Arbiter::new(&stage_cfg, &self.app.config.control, &policy);
        let input = CycleInput {
            reading: &reading,
            vpd,
            current: self.state.actuators,
            anomaly: false,
            now,
        };
        let mut decision = arbiter.decide(&input, &self.app.overrides);

        if let Some(skip) = decision.skipped {
            tracing::info!(reason = %skip, "skipping actuation");
            self.finish_cycle(Some(decision), dirty);
            return Ok(CycleOutcome::Skipped(skip));
        }
        if let Some(p) = &decision.policy {
            tracing::debug!(action = %p.action, degraded = p.source.is_degraded(), "learned policy consulted");
        }

        if self.pending_exhaust_off && !decision.finish_air_exchange() {
            tracing::debug!(
                reason = ?decision.reason(ActuatorKind::Exhaust),
                "exhaust now owned by another rule, dropping pending shutoff"
            );
            self.pending_exhaust_off = false;
        }

        let commands = decision.commands(&self.state.actuators);
        let (sent, failed) = self.apply(&commands).await?;
        if sent > 0 {
            dirty = true;
        }
        if !self.state.actuators.exhaust {
            self.pending_exhaust_off = false;
        }
        tracing::debug!(
            leaf_vpd = vpd.leaf_vpd,
            air_vpd = vpd.air_vpd,
            humidity = reading.humidity,
            sent,
            failed,
            "cycle complete"
        );
        self.finish_cycle(Some(decision), dirty);
        Ok(CycleOutcome::Actuated { sent, failed })
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn read_sensors(&mut self) -> Result<SensorReading, ControlError> {
        let sensors = Arc::clone(&self.devices.sensors);
        let sensors = &sensors;
        match self.retry.run("sensor read", move || sensors.read()).await {
            Ok(reading) => {
                self.status.consecutive_fallbacks = 0;
                Ok(reading)
            }
            Err(e) if e.is_fatal() => Err(ControlError::Device {
                what: "sensor read".to_string(),
                source: e,
            }),
            Err(e) => {
                self.status.consecutive_fallbacks += 1;
                tracing::warn!(
                    error = %e,
                    consecutive = self.status.consecutive_fallbacks,
                    "sensor read failed, using fallback reading"
                );
                Ok(self.app.config.devices.fallback.to_reading())
            }
        }
    }

    /// True when this cycle must not actuate.
    async fn check_anomaly(
        &self,
        reading: &SensorReading,
        vpd: &VpdPair,
    ) -> Result<bool, ControlError> {
        if !self.app.config.anomaly.enabled || reading.is_fallback() {
            return Ok(false);
        }
        let detector = Arc::clone(&self.devices.anomaly);
        let detector = &detector;
        let result = self
            .retry
            .run("anomaly check", move || detector.is_anomalous(reading, vpd))
            .await;
        match result {
            Ok(flag) => Ok(flag),
            Err(e) if e.is_fatal() => Err(ControlError::Device {
                what: "anomaly check".to_string(),
                source: e,
            }),
            Err(e) => {
                let closed = self.app.config.anomaly.on_error == AnomalyFailurePolicy::FailClosed;
                tracing::warn!(error = %e, fail_closed = closed, "anomaly check failed");
                Ok(closed)
            }
        }
    }

    async fn vent(
        &mut self,
        stage_cfg: &StageConfig,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, ControlError> {
        let duration = stage_cfg.air_exchange_duration();
        tracing::info!(duration_secs = duration.as_secs(), "air exchange started");

        if !self.command(ActuatorKind::Exhaust, true).await? {
            // window not consumed; the next cycle tries again
            self.finish_cycle(None, false);
            return Ok(CycleOutcome::VentFailed);
        }
        self.status.venting = true;
        self.publish();

        let interrupted = sleep_or_shutdown(duration, shutdown).await;

        let ended = self.app.now();
        let restore = self
            .app
            .overrides
            .desired(ActuatorKind::Exhaust, ended)
            .unwrap_or(false);
        self.pending_exhaust_off = !restore && !self.command(ActuatorKind::Exhaust, false).await?;
        if self.pending_exhaust_off {
            tracing::warn!("exhaust shutoff failed, retrying on the next cycle");
        }
        self.window = self.window.completed(ended);
        self.status.venting = false;
        tracing::info!(interrupted, "air exchange finished");
        self.finish_cycle(None, true);
        Ok(CycleOutcome::Vented { interrupted })
    }

    /// Send one command with retry. Returns whether it succeeded; tracked
    /// state only changes on success.
    async fn command(&mut self, kind: ActuatorKind, on: bool) -> Result<bool, ControlError> {
        let actuator = Arc::clone(self.devices.actuators.get(kind));
        let actuator = &actuator;
        match self.retry.run("actuator command", move || actuator.set(on)).await {
            Ok(()) => {
                self.state.actuators.set(kind, on);
                tracing::info!(actuator = %kind, on, "actuator switched");
                Ok(true)
            }
            Err(e) if e.is_fatal() => Err(ControlError::Device {
                what: Command { actuator: kind, turn_on: on }.to_string(),
                source: e,
            }),
            Err(e) => {
                tracing::warn!(actuator = %kind, on, error = %e, "actuator command failed");
                Ok(false)
            }
        }
    }

    async fn apply(&mut self, commands: &[Command]) -> Result<(usize, usize), ControlError> {
        let mut sent = 0;
        let mut failed = 0;
        for cmd in commands {
            if self.command(cmd.actuator, cmd.turn_on).await? {
                sent += 1;
            } else {
                failed += 1;
            }
        }
        Ok((sent, failed))
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    fn finish_cycle(&mut self, decision: Option<Decision>, dirty: bool) {
        let now = self.app.now();
        if decision.is_some() {
            self.status.last_decision = decision;
        }
        if dirty {
            self.state.record(self.state.actuators, self.window, now);
            self.persist();
        }
        self.status.updated_at = now;
        self.publish();
    }

    fn persist(&self) {
        if let Err(e) = self.state.save(&self.app.root) {
            tracing::warn!(error = %e, "failed to persist controller state");
        }
    }

    fn publish(&mut self) {
        self.status.actuators = self.state.actuators;
        self.status.window = self.window;
        self.status.stage = self.state.stage;
        self.app.status.send_replace(self.status.clone());
        self.app.notify();
    }
}

/// Sleep for `duration`; returns true if shutdown was requested first.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = wait_for_shutdown(shutdown) => true,
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // sender gone: nobody can ask us to stop any more
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::time::Instant;
    use vpd_core::config::Config;
    use vpd_core::engine::Reason;
    use vpd_core::policy::PolicyTable;
    use vpd_core::types::{ActuatorState, GrowStage};

    use crate::clock::Clock;
    use crate::device::Actuator;

    // -----------------------------------------------------------------------
    // Fake devices
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    struct Switch {
        at: Duration,
        actuator: ActuatorKind,
        on: bool,
    }

    struct Rig {
        start: Instant,
        reading: Mutex<Result<SensorReading, DeviceError>>,
        anomaly: Mutex<Result<bool, DeviceError>>,
        failures: Mutex<HashMap<ActuatorKind, DeviceError>>,
        reported: Mutex<HashMap<ActuatorKind, Result<bool, DeviceError>>>,
        log: Mutex<Vec<Switch>>,
    }

    impl Rig {
        fn new(reading: SensorReading) -> Arc<Self> {
            Arc::new(Self {
                start: Instant::now(),
                reading: Mutex::new(Ok(reading)),
                anomaly: Mutex::new(Ok(false)),
                failures: Mutex::new(HashMap::new()),
                reported: Mutex::new(HashMap::new()),
                log: Mutex::new(Vec::new()),
            })
        }

        fn set_reading(&self, r: Result<SensorReading, DeviceError>) {
            *self.reading.lock().unwrap() = r;
        }

        fn fail(&self, kind: ActuatorKind, err: DeviceError) {
            self.failures.lock().unwrap().insert(kind, err);
        }

        fn heal(&self, kind: ActuatorKind) {
            self.failures.lock().unwrap().remove(&kind);
        }

        fn switches(&self) -> Vec<Switch> {
            self.log.lock().unwrap().clone()
        }

        fn devices(self: &Arc<Self>) -> Devices {
            let make = |kind| -> Arc<dyn Actuator> {
                Arc::new(FakeActuator {
                    rig: Arc::clone(self),
                    kind,
                })
            };
            Devices {
                sensors: Arc::new(FakeSensor(Arc::clone(self))),
                actuators: ActuatorRegistry::new(
                    make(ActuatorKind::Humidifier),
                    make(ActuatorKind::Dehumidifier),
                    make(ActuatorKind::Exhaust),
                ),
                anomaly: Arc::new(FakeDetector(Arc::clone(self))),
            }
        }
    }

    struct FakeSensor(Arc<Rig>);

    #[async_trait]
    impl SensorSource for FakeSensor {
        async fn read(&self) -> Result<SensorReading, DeviceError> {
            self.0.reading.lock().unwrap().clone()
        }
    }

    struct FakeDetector(Arc<Rig>);

    #[async_trait]
    impl AnomalyDetector for FakeDetector {
        async fn is_anomalous(&self, _: &SensorReading, _: &VpdPair) -> Result<bool, DeviceError> {
            self.0.anomaly.lock().unwrap().clone()
        }
    }

    struct FakeActuator {
        rig: Arc<Rig>,
        kind: ActuatorKind,
    }

    impl FakeActuator {
        fn switch(&self, on: bool) -> Result<(), DeviceError> {
            if let Some(e) = self.rig.failures.lock().unwrap().get(&self.kind) {
                return Err(e.clone());
            }
            self.rig.log.lock().unwrap().push(Switch {
                at: self.rig.start.elapsed(),
                actuator: self.kind,
                on,
            });
            Ok(())
        }
    }

    #[async_trait]
    impl Actuator for FakeActuator {
        async fn turn_on(&self) -> Result<(), DeviceError> {
            self.switch(true)
        }

        async fn turn_off(&self) -> Result<(), DeviceError> {
            self.switch(false)
        }

        async fn get_status(&self) -> Result<bool, DeviceError> {
            self.rig
                .reported
                .lock()
                .unwrap()
                .get(&self.kind)
                .cloned()
                .unwrap_or(Ok(false))
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap()
    }

    fn app(dir: &TempDir, config: Config) -> AppState {
        AppState::with_clock(
            dir.path().to_path_buf(),
            config,
            PolicyTable::empty(),
            GrowStage::Vegetative,
            Clock::starting_at(t0()),
        )
    }

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.devices.retry_attempts = 2;
        config.devices.retry_delay_ms = 10;
        config
    }

    fn controller(dir: &TempDir, config: Config, rig: &Arc<Rig>) -> (AppState, Controller) {
        let app = app(dir, config);
        let mut state = ControllerState::new(GrowStage::Vegetative);
        state.last_exchange_at = Some(t0());
        let ctl = Controller::new(app.clone(), rig.devices(), state);
        (app, ctl)
    }

    fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn unchanged_reading_second_cycle_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 22.8, 65.0));
        let (_app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        let first = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(first, CycleOutcome::Actuated { sent: 1, failed: 0 });
        assert!(ctl.state().actuators.dehumidifier);

        let second = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(second, CycleOutcome::Actuated { sent: 0, failed: 0 });
        assert_eq!(rig.switches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_command_leaves_state_and_retries_next_cycle() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 22.8, 65.0));
        rig.fail(ActuatorKind::Dehumidifier, DeviceError::Transient("plug offline".into()));
        let (_app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Actuated { sent: 0, failed: 1 });
        assert!(!ctl.state().actuators.dehumidifier);

        rig.heal(ActuatorKind::Dehumidifier);
        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Actuated { sent: 1, failed: 0 });
        assert!(ctl.state().actuators.dehumidifier);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_device_error_ends_the_loop() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 22.8, 65.0));
        rig.fail(ActuatorKind::Dehumidifier, DeviceError::Unauthorized("401".into()));
        let (_app, ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, rx) = no_shutdown();

        let err = ctl.run(rx).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Device {
                source: DeviceError::Unauthorized(_),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_failure_falls_back_without_actuating() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 22.8, 65.0));
        rig.set_reading(Err(DeviceError::Timeout));
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        for _ in 0..3 {
            let out = ctl.run_cycle(&mut rx).await.unwrap();
            assert_eq!(out, CycleOutcome::Skipped(SkipReason::FallbackReading));
        }
        let status = app.status.borrow().clone();
        assert_eq!(status.consecutive_fallbacks, 3);
        assert!(status.reading.unwrap().is_fallback());
        assert!(rig.switches().is_empty());

        rig.set_reading(Ok(SensorReading::live(24.0, 23.0, 58.0)));
        ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(app.status.borrow().consecutive_fallbacks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn anomaly_skips_cycle() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(27.0, 26.0, 65.0));
        *rig.anomaly.lock().unwrap() = Ok(true);
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Skipped(SkipReason::Anomaly));
        assert!(rig.switches().is_empty());
        let status = app.status.borrow().clone();
        assert_eq!(
            status.last_decision.unwrap().skipped,
            Some(SkipReason::Anomaly)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn anomaly_check_failure_follows_policy() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 22.8, 65.0));
        *rig.anomaly.lock().unwrap() = Err(DeviceError::Transient("model down".into()));

        let (_app, mut closed) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();
        assert_eq!(
            closed.run_cycle(&mut rx).await.unwrap(),
            CycleOutcome::Skipped(SkipReason::Anomaly)
        );

        let mut config = quick_config();
        config.anomaly.on_error = AnomalyFailurePolicy::FailOpen;
        let (_app, mut open) = controller(&dir, config, &rig);
        assert_eq!(
            open.run_cycle(&mut rx).await.unwrap(),
            CycleOutcome::Actuated { sent: 1, failed: 0 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn air_exchange_cadence_beats_vpd_rule() {
        let dir = TempDir::new().unwrap();
        // leaf VPD 1.47: rule 5 wants the exhaust off every cycle
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 45.0));
        let (_app, ctl) = controller(&dir, quick_config(), &rig);
        let (tx, rx) = no_shutdown();

        let handle = tokio::spawn(ctl.run(rx));
        // stop ten seconds into the second vent
        tokio::time::sleep(Duration::from_secs(3850)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let exhaust: Vec<Switch> = rig
            .switches()
            .into_iter()
            .filter(|s| s.actuator == ActuatorKind::Exhaust)
            .collect();
        assert_eq!(
            exhaust,
            vec![
                Switch { at: Duration::from_secs(1800), actuator: ActuatorKind::Exhaust, on: true },
                Switch { at: Duration::from_secs(2040), actuator: ActuatorKind::Exhaust, on: false },
                Switch { at: Duration::from_secs(3840), actuator: ActuatorKind::Exhaust, on: true },
                Switch { at: Duration::from_secs(3850), actuator: ActuatorKind::Exhaust, on: false },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_vent_shutoff_is_retried_until_exhaust_off() {
        let dir = TempDir::new().unwrap();
        // dead zone: no rule decides the exhaust after the vent
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        let (app, ctl) = controller(&dir, quick_config(), &rig);
        let (tx, rx) = no_shutdown();

        let handle = tokio::spawn(ctl.run(rx));
        tokio::time::sleep(Duration::from_secs(1810)).await;
        assert!(app.status.borrow().venting);
        rig.fail(ActuatorKind::Exhaust, DeviceError::Transient("plug offline".into()));

        // vent ends at 2040 with the plug still down
        tokio::time::sleep(Duration::from_secs(290)).await;
        assert!(app.status.borrow().actuators.exhaust);
        rig.heal(ActuatorKind::Exhaust);

        // twenty healthy cycles
        tokio::time::sleep(Duration::from_secs(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let exhaust: Vec<Switch> = rig
            .switches()
            .into_iter()
            .filter(|s| s.actuator == ActuatorKind::Exhaust)
            .collect();
        assert_eq!(exhaust.len(), 2);
        assert!(exhaust[0].on);
        assert!(!exhaust[1].on);
        assert!(exhaust[1].at >= Duration::from_secs(2100));
        assert!(!app.status.borrow().actuators.exhaust);
        let saved = ControllerState::load_or_default(dir.path(), GrowStage::Vegetative).unwrap();
        assert!(!saved.actuators.exhaust);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_vent_shutoff_reports_air_exchange_reason() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        tokio::time::sleep(Duration::from_secs(1800)).await;
        let (out, ()) = tokio::join!(ctl.run_cycle(&mut rx), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            rig.fail(ActuatorKind::Exhaust, DeviceError::Timeout);
        });
        assert_eq!(out.unwrap(), CycleOutcome::Vented { interrupted: false });
        // window is consumed even though the exhaust is still on
        assert!(ctl.state().actuators.exhaust);
        assert!(ctl.window().last_exchange_at > t0());

        // still failing: state unchanged, shutoff stays pending
        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Actuated { sent: 0, failed: 1 });
        assert!(ctl.state().actuators.exhaust);

        rig.heal(ActuatorKind::Exhaust);
        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Actuated { sent: 1, failed: 0 });
        assert!(!ctl.state().actuators.exhaust);
        let decision = app.status.borrow().last_decision.clone().unwrap();
        assert_eq!(decision.reason(ActuatorKind::Exhaust), Some(Reason::AirExchange));

        // once off, the exhaust is held again
        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Actuated { sent: 0, failed: 0 });
        let decision = app.status.borrow().last_decision.clone().unwrap();
        assert_eq!(decision.reason(ActuatorKind::Exhaust), Some(Reason::Hold));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_vent_shutoff_yields_to_exhaust_override() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        tokio::time::sleep(Duration::from_secs(1800)).await;
        let (out, ()) = tokio::join!(ctl.run_cycle(&mut rx), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            rig.fail(ActuatorKind::Exhaust, DeviceError::Timeout);
        });
        assert_eq!(out.unwrap(), CycleOutcome::Vented { interrupted: false });
        rig.heal(ActuatorKind::Exhaust);

        app.overrides.set_override(ActuatorKind::Exhaust, true, app.now());
        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Actuated { sent: 0, failed: 0 });
        assert!(ctl.state().actuators.exhaust);

        // the override cancelled the pending shutoff; clearing it leaves the exhaust held
        app.overrides.clear(ActuatorKind::Exhaust);
        ctl.run_cycle(&mut rx).await.unwrap();
        assert!(ctl.state().actuators.exhaust);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_vent_start_keeps_window_open() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        rig.fail(ActuatorKind::Exhaust, DeviceError::Transient("plug offline".into()));
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        tokio::time::sleep(Duration::from_secs(1800)).await;
        assert_eq!(ctl.run_cycle(&mut rx).await.unwrap(), CycleOutcome::VentFailed);
        assert_eq!(ctl.window().last_exchange_at, t0());
        assert!(!ctl.state().actuators.exhaust);
        assert!(!app.status.borrow().venting);
        assert!(rig.switches().is_empty());

        rig.heal(ActuatorKind::Exhaust);
        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Vented { interrupted: false });
        assert!(ctl.window().last_exchange_at > t0());
        assert!(!ctl.state().actuators.exhaust);
        assert_eq!(rig.switches().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_vent_turns_exhaust_off() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        let (app, ctl) = controller(&dir, quick_config(), &rig);
        let (tx, rx) = no_shutdown();

        let handle = tokio::spawn(ctl.run(rx));
        tokio::time::sleep(Duration::from_secs(1860)).await;
        assert!(app.status.borrow().venting);
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let last = rig.switches().pop().unwrap();
        assert_eq!(last.actuator, ActuatorKind::Exhaust);
        assert!(!last.on);
        let saved = ControllerState::load_or_default(dir.path(), GrowStage::Vegetative).unwrap();
        assert!(!saved.actuators.exhaust);
    }

    #[tokio::test(start_paused = true)]
    async fn vent_deferred_while_exhaust_overridden_off() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        tokio::time::sleep(Duration::from_secs(1800)).await;
        app.overrides.set_override(ActuatorKind::Exhaust, false, app.now());
        assert_eq!(ctl.run_cycle(&mut rx).await.unwrap(), CycleOutcome::VentDeferred);
        assert_eq!(ctl.window().last_exchange_at, t0());

        app.overrides.clear(ActuatorKind::Exhaust);
        let out = ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(out, CycleOutcome::Vented { interrupted: false });
        assert!(ctl.window().last_exchange_at > t0());
    }

    #[tokio::test(start_paused = true)]
    async fn vent_restores_exhaust_override_on() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        tokio::time::sleep(Duration::from_secs(1800)).await;
        app.overrides.set_override(ActuatorKind::Exhaust, true, app.now());
        ctl.run_cycle(&mut rx).await.unwrap();
        assert!(ctl.state().actuators.exhaust);
        assert_eq!(
            rig.switches(),
            vec![Switch { at: Duration::from_secs(1800), actuator: ActuatorKind::Exhaust, on: true }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stage_change_is_picked_up_and_persisted() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let (_tx, mut rx) = no_shutdown();

        app.stage.send_replace(GrowStage::Flowering);
        ctl.run_cycle(&mut rx).await.unwrap();
        assert_eq!(ctl.state().stage, GrowStage::Flowering);
        // 58 % is above the flowering ceiling of 55 %
        assert!(ctl.state().actuators.dehumidifier);

        let saved = ControllerState::load_or_default(dir.path(), GrowStage::Vegetative).unwrap();
        assert_eq!(saved.stage, GrowStage::Flowering);
    }

    #[tokio::test(start_paused = true)]
    async fn startup_sync_adopts_device_state() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 23.0, 58.0));
        rig.reported.lock().unwrap().insert(ActuatorKind::Exhaust, Ok(true));
        rig.reported
            .lock()
            .unwrap()
            .insert(ActuatorKind::Humidifier, Err(DeviceError::Timeout));
        let (_app, mut ctl) = controller(&dir, quick_config(), &rig);

        ctl.sync_from_devices().await.unwrap();
        assert_eq!(
            ctl.state().actuators,
            ActuatorState::all_off().with(ActuatorKind::Exhaust, true)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn status_is_published_each_cycle() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::new(SensorReading::live(24.0, 22.8, 65.0));
        let (app, mut ctl) = controller(&dir, quick_config(), &rig);
        let mut events = app.event_tx.subscribe();
        let (_tx, mut rx) = no_shutdown();

        ctl.run_cycle(&mut rx).await.unwrap();
        let status = app.status.borrow().clone();
        assert_eq!(status.cycles, 1);
        assert_eq!(status.zone, Some(VpdZone::Healthy));
        assert!(status.actuators.dehumidifier);
        assert!(events.try_recv().is_ok());
    }
}
