//! The per-cycle arbitration engine.
//!
//! Rules are evaluated in priority order. The first rule that decides an
//! actuator owns it for the cycle; lower rules only touch actuators that are
//! still undecided. Undecided actuators keep their tracked state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ControlConfig;
use crate::overrides::OverrideTracker;
use crate::policy::{best_action, PolicyDecision, PolicyTable, StateKey, SynthesisContext};
use crate::stage::StageConfig;
use crate::types::{ActuatorKind, ActuatorState, Command, SensorReading};
use crate::vpd::{required_humidity, VpdPair};

// ---------------------------------------------------------------------------
// Reason / SkipReason
// ---------------------------------------------------------------------------

/// Which rule settled an actuator's desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Override,
    SafetyCeiling,
    HumidityCeiling,
    HumidityBelowBuffer,
    HumidityFloor,
    HumidityDeadZone,
    VpdHigh,
    VpdLow,
    LearnedPolicy,
    IdleConsolidation,
    MutualExclusion,
    /// Exhaust shutoff left over from an air exchange whose OFF failed.
    AirExchange,
    Hold,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Override => "override",
            Reason::SafetyCeiling => "safety_ceiling",
            Reason::HumidityCeiling => "humidity_ceiling",
            Reason::HumidityBelowBuffer => "humidity_below_buffer",
            Reason::HumidityFloor => "humidity_floor",
            Reason::HumidityDeadZone => "humidity_dead_zone",
            Reason::VpdHigh => "vpd_high",
            Reason::VpdLow => "vpd_low",
            Reason::LearnedPolicy => "learned_policy",
            Reason::IdleConsolidation => "idle_consolidation",
            Reason::MutualExclusion => "mutual_exclusion",
            Reason::AirExchange => "air_exchange",
            Reason::Hold => "hold",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cycle performed no actuation at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Anomaly,
    UnusableVpd,
    FallbackReading,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Anomaly => "anomaly",
            SkipReason::UnusableVpd => "unusable_vpd",
            SkipReason::FallbackReading => "fallback_reading",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Inputs / Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct CycleInput<'a> {
    pub reading: &'a SensorReading,
    pub vpd: VpdPair,
    pub current: ActuatorState,
    pub anomaly: bool,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub desired: ActuatorState,
    pub reasons: BTreeMap<ActuatorKind, Reason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyDecision>,
    /// Humidity that would put leaf VPD at the band midpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_humidity: Option<f64>,
    /// Overrides the engine cleared this cycle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleared_overrides: Vec<ActuatorKind>,
}

impl Decision {
    pub fn skip(current: ActuatorState, reason: SkipReason) -> Self {
        Self {
            desired: current,
            reasons: BTreeMap::new(),
            skipped: Some(reason),
            policy: None,
            target_humidity: None,
            cleared_overrides: Vec::new(),
        }
    }

    /// Commands that move `current` to the desired state.
    pub fn commands(&self, current: &ActuatorState) -> Vec<Command> {
        current.diff(&self.desired)
    }

    pub fn reason(&self, kind: ActuatorKind) -> Option<Reason> {
        self.reasons.get(&kind).copied()
    }

    /// Turn a held exhaust OFF to finish an air exchange whose shutoff did
    /// not go through. Any rule that decided the exhaust wins. Returns
    /// whether the exhaust was claimed.
    pub fn finish_air_exchange(&mut self) -> bool {
        if self.skipped.is_some() || self.reason(ActuatorKind::Exhaust) != Some(Reason::Hold) {
            return false;
        }
        self.desired.set(ActuatorKind::Exhaust, false);
        self.reasons.insert(ActuatorKind::Exhaust, Reason::AirExchange);
        true
    }
}

// ---------------------------------------------------------------------------
// Arbiter
// ---------------------------------------------------------------------------

/// Per-actuator first-decision-wins bookkeeping.
#[derive(Default)]
struct Slots {
    decided: BTreeMap<ActuatorKind, (bool, Reason)>,
}

impl Slots {
    fn decide(&mut self, kind: ActuatorKind, on: bool, reason: Reason) {
        self.decided.entry(kind).or_insert((on, reason));
    }

    fn is_decided(&self, kind: ActuatorKind) -> bool {
        self.decided.contains_key(&kind)
    }

    fn any_on(&self) -> bool {
        self.decided.values().any(|(on, _)| *on)
    }
}

pub struct Arbiter<'a> {
    pub stage: &'a StageConfig,
    pub control: &'a ControlConfig,
    pub policy: &'a PolicyTable,
}

impl<'a> Arbiter<'a> {
    pub fn new(stage: &'a StageConfig, control: &'a ControlConfig, policy: &'a PolicyTable) -> Self {
        Self {
            stage,
            control,
            policy,
        }
    }

    pub fn decide(&self, input: &CycleInput<'_>, overrides: &OverrideTracker) -> Decision {
        let current = input.current;

        if input.anomaly {
            return Decision::skip(current, SkipReason::Anomaly);
        }
        if input.reading.is_fallback() {
            return Decision::skip(current, SkipReason::FallbackReading);
        }
        if !input.vpd.is_usable() {
            return Decision::skip(current, SkipReason::UnusableVpd);
        }

        let reading = input.reading;
        let stage = self.stage;
        let mut slots = Slots::default();
        let mut locked: Vec<ActuatorKind> = Vec::new();

        // Rule 2: active overrides.
        for kind in ActuatorKind::all() {
            if let Some(on) = overrides.desired(*kind, input.now) {
                slots.decide(*kind, on, Reason::Override);
                locked.push(*kind);
            }
        }

        // Rule 3: temperature safety ceiling.
        if reading.air_temp > stage.max_air_temp_or(self.control.max_air_temp) {
            slots.decide(ActuatorKind::Exhaust, true, Reason::SafetyCeiling);
        }

        // Rule 4: humidity ceiling, buffer and floor.
        if reading.humidity > stage.max_humidity {
            slots.decide(ActuatorKind::Humidifier, false, Reason::HumidityCeiling);
            slots.decide(ActuatorKind::Dehumidifier, true, Reason::HumidityCeiling);
        } else if reading.humidity < stage.max_humidity - self.control.humidity_buffer {
            slots.decide(ActuatorKind::Dehumidifier, false, Reason::HumidityBelowBuffer);
            if reading.humidity < stage.min_humidity {
                slots.decide(ActuatorKind::Humidifier, true, Reason::HumidityFloor);
                // no-op when the safety ceiling already holds the exhaust on
                slots.decide(ActuatorKind::Exhaust, false, Reason::HumidityFloor);
            }
        } else {
            slots.decide(ActuatorKind::Humidifier, false, Reason::HumidityDeadZone);
            slots.decide(ActuatorKind::Dehumidifier, false, Reason::HumidityDeadZone);
        }

        // Rule 5: leaf VPD band.
        let leaf_vpd = input.vpd.leaf_vpd;
        let tolerance = self.control.kpa_tolerance;
        let target_humidity = required_humidity(stage.midpoint(), reading.air_temp, reading.leaf_temp);
        let mut policy = None;
        if leaf_vpd > stage.vpd_max + tolerance {
            slots.decide(ActuatorKind::Exhaust, false, Reason::VpdHigh);
            slots.decide(ActuatorKind::Humidifier, true, Reason::VpdHigh);
        } else if leaf_vpd < stage.vpd_min - tolerance {
            slots.decide(ActuatorKind::Humidifier, false, Reason::VpdLow);
            slots.decide(ActuatorKind::Exhaust, true, Reason::VpdLow);
        } else if !stage.in_band(leaf_vpd) {
            // Off target but inside the tolerance margin: ask the learned policy.
            if let Some(state) = StateKey::from_observation(reading, &input.vpd) {
                let ctx = SynthesisContext::new(stage, self.control);
                let decision =
                    best_action(&state, self.policy, &ctx, self.control.neighbor_tolerance);
                let kind = decision.action.actuator();
                if !slots.is_decided(kind) {
                    slots.decide(kind, decision.action.desired_state(), Reason::LearnedPolicy);
                }
                policy = Some(decision);
            }
        }

        // Rule 6: idle consolidation.
        if !slots.any_on() && current.all_on() {
            for kind in ActuatorKind::all() {
                slots.decide(*kind, false, Reason::IdleConsolidation);
            }
        }

        let mut desired = current;
        let mut reasons = BTreeMap::new();
        for kind in ActuatorKind::all() {
            let (on, reason) = slots
                .decided
                .get(kind)
                .copied()
                .unwrap_or((current.get(*kind), Reason::Hold));
            desired.set(*kind, on);
            reasons.insert(*kind, reason);
        }

        let mut cleared_overrides = Vec::new();
        if !desired.is_mutually_exclusive() {
            let hum_locked = locked.contains(&ActuatorKind::Humidifier);
            let dehum_locked = locked.contains(&ActuatorKind::Dehumidifier);
            let loser = if hum_locked && !dehum_locked {
                ActuatorKind::Dehumidifier
            } else {
                ActuatorKind::Humidifier
            };
            if hum_locked && dehum_locked {
                overrides.clear(ActuatorKind::Humidifier);
                cleared_overrides.push(ActuatorKind::Humidifier);
                tracing::warn!("humidifier and dehumidifier both overridden on, clearing humidifier override");
            }
            desired.set(loser, false);
            reasons.insert(loser, Reason::MutualExclusion);
        }

        Decision {
            desired,
            reasons,
            skipped: None,
            policy,
            target_humidity: Some(target_humidity),
            cleared_overrides,
        }
    }
}
