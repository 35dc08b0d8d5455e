use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::kdtree::KdTree;
use crate::error::{Result, VpdError};
use crate::types::{ActionId, SensorReading};
use crate::vpd::VpdPair;

pub const TABLE_VERSION: u32 = 1;

/// Number of features in a state vector.
pub const FEATURES: usize = 5;

// Feature bounds: humidity %, leaf °C, air °C, air VPD kPa, leaf VPD kPa.
const LOWER: [f64; FEATURES] = [0.0, -10.0, -10.0, 0.0, -1.0];
const UPPER: [f64; FEATURES] = [100.0, 50.0, 50.0, 5.0, 5.0];

// ---------------------------------------------------------------------------
// StateKey
// ---------------------------------------------------------------------------

/// A discretized observation: humidity in whole percent snapped to a
/// multiple of 5, everything else in tenths. Integer components keep hashing
/// and equality exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey([i64; FEATURES]);

impl StateKey {
    /// Discretize a raw `[humidity, leaf_temp, air_temp, vpd_air, vpd_leaf]`
    /// vector. Returns `None` if any component is not finite.
    pub fn discretize(raw: [f64; FEATURES]) -> Option<Self> {
        if raw.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let mut key = [0i64; FEATURES];
        for (i, value) in raw.iter().enumerate() {
            let clamped = value.clamp(LOWER[i], UPPER[i]);
            key[i] = if i == 0 {
                ((clamped / 5.0).round() * 5.0) as i64
            } else {
                (clamped * 10.0).round() as i64
            };
        }
        Some(StateKey(key))
    }

    pub fn from_observation(reading: &SensorReading, vpd: &VpdPair) -> Option<Self> {
        Self::discretize([
            reading.humidity,
            reading.leaf_temp,
            reading.air_temp,
            vpd.air_vpd,
            vpd.leaf_vpd,
        ])
    }

    /// Back to feature space for distance computations.
    pub fn features(&self) -> [f64; FEATURES] {
        let mut out = [0.0; FEATURES];
        for (i, v) in self.0.iter().enumerate() {
            out[i] = if i == 0 { *v as f64 } else { *v as f64 / 10.0 };
        }
        out
    }

    pub fn humidity(&self) -> f64 {
        self.features()[0]
    }

    pub fn air_temp(&self) -> f64 {
        self.features()[2]
    }

    pub fn leaf_vpd(&self) -> f64 {
        self.features()[4]
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [h, leaf, air, va, vl] = self.features();
        write!(f, "({h}, {leaf}, {air}, {va}, {vl})")
    }
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub state: [f64; FEATURES],
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTableFile {
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<PolicyEntry>,
}

// ---------------------------------------------------------------------------
// PolicyTable
// ---------------------------------------------------------------------------

/// Read-only action-value table plus a k-d tree over its keys.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    values: HashMap<StateKey, Vec<f64>>,
    index: KdTree,
}

impl PolicyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = PolicyEntry>) -> Self {
        let mut values = HashMap::new();
        for entry in entries {
            match StateKey::discretize(entry.state) {
                Some(key) => {
                    values.insert(key, entry.values);
                }
                None => tracing::warn!(state = ?entry.state, "skipping policy entry with non-finite state"),
            }
        }
        let mut keys: Vec<StateKey> = values.keys().copied().collect();
        keys.sort();
        let index = KdTree::build(keys);
        Self { values, index }
    }

    pub fn from_file(file: PolicyTableFile) -> Result<Self> {
        if file.version != TABLE_VERSION {
            return Err(VpdError::PolicyTable(format!(
                "unsupported table version {} (expected {TABLE_VERSION})",
                file.version
            )));
        }
        Ok(Self::from_entries(file.entries))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            VpdError::PolicyTable(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: PolicyTableFile = serde_json::from_str(&data)?;
        let table = Self::from_file(file)?;
        tracing::info!(path = %path.display(), states = table.len(), "loaded policy table");
        Ok(table)
    }

    /// Load the table if the file exists, otherwise start empty.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "no policy table, rule synthesis only");
            Ok(Self::empty())
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn index(&self) -> &KdTree {
        &self.index
    }

    /// Highest-valued known action for an exact key. Indices outside the
    /// action set and NaN values are ignored; ties go to the lowest id.
    pub fn best_exact(&self, key: &StateKey) -> Option<ActionId> {
        let values = self.values.get(key)?;
        let mut best: Option<(ActionId, f64)> = None;
        for (i, value) in values.iter().enumerate().take(ActionId::COUNT) {
            if value.is_nan() {
                continue;
            }
            let Some(action) = ActionId::from_index(i) else {
                continue;
            };
            match best {
                Some((_, v)) if *value <= v => {}
                _ => best = Some((action, *value)),
            }
        }
        best.map(|(action, _)| action)
    }
}
