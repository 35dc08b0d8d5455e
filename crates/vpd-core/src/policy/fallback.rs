use serde::{Deserialize, Serialize};

use super::table::{PolicyTable, StateKey};
use crate::config::ControlConfig;
use crate::stage::StageConfig;
use crate::types::ActionId;

/// Leaf VPD within this distance of the band midpoint gives synthesis
/// nothing to correct.
pub const SYNTHESIS_DEADBAND: f64 = 0.05;

/// How a policy decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionSource {
    Exact,
    Neighbor { distance: f64 },
    Synthesized,
    Default,
}

impl DecisionSource {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, DecisionSource::Exact)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub action: ActionId,
    pub source: DecisionSource,
}

/// Stage targets the rule synthesis steers toward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisContext {
    pub midpoint: f64,
    pub max_humidity: f64,
    pub humidity_buffer: f64,
    pub max_air_temp: f64,
}

impl SynthesisContext {
    pub fn new(stage: &StageConfig, control: &ControlConfig) -> Self {
        Self {
            midpoint: stage.midpoint(),
            max_humidity: stage.max_humidity,
            humidity_buffer: control.humidity_buffer,
            max_air_temp: stage.max_air_temp_or(control.max_air_temp),
        }
    }
}

/// Rule-based action for a state the table cannot answer. Moves leaf VPD
/// toward the band midpoint; `None` when already there.
pub fn synthesize(state: &StateKey, ctx: &SynthesisContext) -> Option<ActionId> {
    let humidity = state.humidity();
    let leaf_vpd = state.leaf_vpd();

    if state.air_temp() > ctx.max_air_temp {
        return Some(ActionId::ExhaustOn);
    }
    if humidity > ctx.max_humidity {
        return Some(ActionId::DehumidifierOn);
    }
    if leaf_vpd > ctx.midpoint + SYNTHESIS_DEADBAND {
        // too dry: add moisture if there is headroom, else stop venting
        if humidity < ctx.max_humidity - ctx.humidity_buffer {
            return Some(ActionId::HumidifierOn);
        }
        return Some(ActionId::ExhaustOff);
    }
    if leaf_vpd < ctx.midpoint - SYNTHESIS_DEADBAND {
        return Some(ActionId::ExhaustOn);
    }
    None
}

/// Resolve the learned action for `state`.
///
/// Exact table hit first, then the nearest known state within `tolerance`,
/// then rule synthesis, then exhaust-off. Deterministic for a given table.
pub fn best_action(
    state: &StateKey,
    table: &PolicyTable,
    ctx: &SynthesisContext,
    tolerance: f64,
) -> PolicyDecision {
    if let Some(action) = table.best_exact(state) {
        return PolicyDecision {
            action,
            source: DecisionSource::Exact,
        };
    }

    if let Some((neighbor, distance)) = table.index().nearest_within(&state.features(), tolerance) {
        if let Some(action) = table.best_exact(&neighbor) {
            tracing::warn!(
                %state,
                %neighbor,
                distance,
                action = %action,
                "unseen policy state, reusing nearest neighbor"
            );
            return PolicyDecision {
                action,
                source: DecisionSource::Neighbor { distance },
            };
        }
    }

    if let Some(action) = synthesize(state, ctx) {
        tracing::warn!(%state, action = %action, "unseen policy state, synthesized rule action");
        return PolicyDecision {
            action,
            source: DecisionSource::Synthesized,
        };
    }

    tracing::warn!(%state, "policy synthesis inconclusive, defaulting to exhaust off");
    PolicyDecision {
        action: ActionId::ExhaustOff,
        source: DecisionSource::Default,
    }
}
