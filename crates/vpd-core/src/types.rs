use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::VpdError;

// ---------------------------------------------------------------------------
// GrowStage
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GrowStage {
    Propagation,
    #[default]
    Vegetative,
    Flowering,
}

impl GrowStage {
    pub fn all() -> &'static [GrowStage] {
        &[
            GrowStage::Propagation,
            GrowStage::Vegetative,
            GrowStage::Flowering,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GrowStage::Propagation => "propagation",
            GrowStage::Vegetative => "vegetative",
            GrowStage::Flowering => "flowering",
        }
    }
}

impl fmt::Display for GrowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GrowStage {
    type Err = VpdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "propagation" => Ok(GrowStage::Propagation),
            "vegetative" => Ok(GrowStage::Vegetative),
            "flowering" => Ok(GrowStage::Flowering),
            _ => Err(VpdError::UnknownStage(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ActuatorKind
// ---------------------------------------------------------------------------

/// The closed set of devices the engine drives. Adding a device means
/// extending this enum and every exhaustive match over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKind {
    Humidifier,
    Dehumidifier,
    Exhaust,
}

impl ActuatorKind {
    pub fn all() -> &'static [ActuatorKind] {
        &[
            ActuatorKind::Humidifier,
            ActuatorKind::Dehumidifier,
            ActuatorKind::Exhaust,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActuatorKind::Humidifier => "humidifier",
            ActuatorKind::Dehumidifier => "dehumidifier",
            ActuatorKind::Exhaust => "exhaust",
        }
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActuatorKind {
    type Err = VpdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "humidifier" => Ok(ActuatorKind::Humidifier),
            "dehumidifier" => Ok(ActuatorKind::Dehumidifier),
            "exhaust" => Ok(ActuatorKind::Exhaust),
            _ => Err(VpdError::UnknownActuator(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ActuatorState
// ---------------------------------------------------------------------------

/// What the engine believes is currently commanded on each device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub humidifier: bool,
    pub dehumidifier: bool,
    pub exhaust: bool,
}

impl ActuatorState {
    pub fn all_off() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ActuatorKind) -> bool {
        match kind {
            ActuatorKind::Humidifier => self.humidifier,
            ActuatorKind::Dehumidifier => self.dehumidifier,
            ActuatorKind::Exhaust => self.exhaust,
        }
    }

    pub fn set(&mut self, kind: ActuatorKind, on: bool) {
        match kind {
            ActuatorKind::Humidifier => self.humidifier = on,
            ActuatorKind::Dehumidifier => self.dehumidifier = on,
            ActuatorKind::Exhaust => self.exhaust = on,
        }
    }

    pub fn with(mut self, kind: ActuatorKind, on: bool) -> Self {
        self.set(kind, on);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActuatorKind, bool)> + '_ {
        ActuatorKind::all().iter().map(move |k| (*k, self.get(*k)))
    }

    pub fn all_on(&self) -> bool {
        self.humidifier && self.dehumidifier && self.exhaust
    }

    /// Humidifier and dehumidifier are never both on.
    pub fn is_mutually_exclusive(&self) -> bool {
        !(self.humidifier && self.dehumidifier)
    }

    /// Commands needed to move from `self` to `desired`, in `ActuatorKind::all()` order.
    pub fn diff(&self, desired: &ActuatorState) -> Vec<Command> {
        ActuatorKind::all()
            .iter()
            .filter(|k| self.get(**k) != desired.get(**k))
            .map(|k| Command {
                actuator: *k,
                turn_on: desired.get(*k),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub actuator: ActuatorKind,
    pub turn_on: bool,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.turn_on { "on" } else { "off" };
        write!(f, "{} {verb}", self.actuator)
    }
}

// ---------------------------------------------------------------------------
// ActionId
// ---------------------------------------------------------------------------

/// Actions of the learned policy. Indices match the action-value vectors
/// stored in the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionId {
    ExhaustOn = 0,
    ExhaustOff = 1,
    HumidifierOn = 2,
    HumidifierOff = 3,
    DehumidifierOn = 4,
    DehumidifierOff = 5,
}

impl ActionId {
    pub const COUNT: usize = 6;

    pub fn all() -> &'static [ActionId] {
        &[
            ActionId::ExhaustOn,
            ActionId::ExhaustOff,
            ActionId::HumidifierOn,
            ActionId::HumidifierOff,
            ActionId::DehumidifierOn,
            ActionId::DehumidifierOff,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<ActionId> {
        Self::all().get(i).copied()
    }

    pub fn actuator(self) -> ActuatorKind {
        match self {
            ActionId::ExhaustOn | ActionId::ExhaustOff => ActuatorKind::Exhaust,
            ActionId::HumidifierOn | ActionId::HumidifierOff => ActuatorKind::Humidifier,
            ActionId::DehumidifierOn | ActionId::DehumidifierOff => ActuatorKind::Dehumidifier,
        }
    }

    pub fn desired_state(self) -> bool {
        matches!(
            self,
            ActionId::ExhaustOn | ActionId::HumidifierOn | ActionId::DehumidifierOn
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionId::ExhaustOn => "exhaust_on",
            ActionId::ExhaustOff => "exhaust_off",
            ActionId::HumidifierOn => "humidifier_on",
            ActionId::HumidifierOff => "humidifier_off",
            ActionId::DehumidifierOn => "dehumidifier_on",
            ActionId::DehumidifierOff => "dehumidifier_off",
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionId {
    type Err = VpdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| VpdError::UnknownAction(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// SensorReading
// ---------------------------------------------------------------------------

/// Air temperature used when the sensor hub has no reading at all.
pub const FALLBACK_AIR_TEMP: f64 = 20.0;
pub const FALLBACK_LEAF_TEMP: f64 = 18.8;
pub const FALLBACK_HUMIDITY: f64 = 50.0;

/// Leaf surface runs this many degrees below air when no leaf sensor exists.
pub const LEAF_TEMP_OFFSET: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    #[default]
    Live,
    /// Retries were exhausted and the documented default triple was substituted.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub air_temp: f64,
    pub leaf_temp: f64,
    pub humidity: f64,
    #[serde(default)]
    pub source: ReadingSource,
}

impl SensorReading {
    pub fn live(air_temp: f64, leaf_temp: f64, humidity: f64) -> Self {
        Self {
            air_temp,
            leaf_temp,
            humidity,
            source: ReadingSource::Live,
        }
    }

    pub fn fallback() -> Self {
        Self {
            air_temp: FALLBACK_AIR_TEMP,
            leaf_temp: FALLBACK_LEAF_TEMP,
            humidity: FALLBACK_HUMIDITY,
            source: ReadingSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ReadingSource::Fallback
    }
}

/// Estimate leaf temperature from air temperature, rounded to 0.1 °C.
pub fn estimate_leaf_temp(air_temp: f64) -> f64 {
    ((air_temp - LEAF_TEMP_OFFSET).max(0.0) * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
