//! Vapor-pressure-deficit math.
//!
//! All pressures are in kPa, temperatures in °C, humidity in percent.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::SensorReading;

/// Humidity returned by [`required_humidity`] when the air saturation
/// pressure is degenerate.
pub const DEFAULT_REQUIRED_HUMIDITY: f64 = 50.0;

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Saturation vapor pressure (Magnus-type approximation).
pub fn svp(temp: f64) -> f64 {
    0.61078 * ((temp / (temp + 237.3)) * 17.2694).exp()
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VpdPair {
    pub air_vpd: f64,
    pub leaf_vpd: f64,
}

impl VpdPair {
    pub const UNUSABLE: VpdPair = VpdPair {
        air_vpd: 0.0,
        leaf_vpd: 0.0,
    };

    pub fn from_reading(reading: &SensorReading) -> Self {
        vpd(
            Some(reading.air_temp),
            Some(reading.leaf_temp),
            Some(reading.humidity),
        )
    }

    /// A `(0, 0)` pair means one of the inputs was missing or not finite.
    pub fn is_usable(&self) -> bool {
        *self != Self::UNUSABLE
    }
}

/// Compute the air and leaf VPD, rounded to 2 decimal places.
///
/// Missing or non-finite inputs yield [`VpdPair::UNUSABLE`] instead of an error.
pub fn vpd(air_temp: Option<f64>, leaf_temp: Option<f64>, humidity: Option<f64>) -> VpdPair {
    let (Some(air), Some(leaf), Some(rh)) = (air_temp, leaf_temp, humidity) else {
        return VpdPair::UNUSABLE;
    };
    if !(air.is_finite() && leaf.is_finite() && rh.is_finite()) {
        return VpdPair::UNUSABLE;
    }
    let air_svp = svp(air);
    let leaf_svp = svp(leaf);
    let fraction = rh / 100.0;
    let pair = VpdPair {
        air_vpd: round_to(air_svp * (1.0 - fraction), 2),
        leaf_vpd: round_to(leaf_svp - air_svp * fraction, 2),
    };
    if pair.air_vpd.is_finite() && pair.leaf_vpd.is_finite() {
        pair
    } else {
        VpdPair::UNUSABLE
    }
}

/// Relative humidity that would produce `target_vpd` at the leaf, clamped to
/// `[0, 100]` and rounded to 0.1.
pub fn required_humidity(target_vpd: f64, air_temp: f64, leaf_temp: f64) -> f64 {
    let air_svp = svp(air_temp);
    if air_svp == 0.0 || !air_svp.is_finite() {
        return DEFAULT_REQUIRED_HUMIDITY;
    }
    let leaf_svp = svp(leaf_temp);
    let rh = (leaf_svp - target_vpd) / air_svp * 100.0;
    if !rh.is_finite() {
        return DEFAULT_REQUIRED_HUMIDITY;
    }
    round_to(rh.clamp(0.0, 100.0), 1)
}

// ---------------------------------------------------------------------------
// VpdZone
// ---------------------------------------------------------------------------

/// Coarse plant-stress classification of a VPD value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VpdZone {
    LowTranspiration,
    Healthy,
    HighTranspiration,
    Danger,
}

impl VpdZone {
    pub fn classify(vpd: f64) -> Self {
        if (0.4..0.8).contains(&vpd) {
            VpdZone::LowTranspiration
        } else if (0.8..1.2).contains(&vpd) {
            VpdZone::Healthy
        } else if (1.2..1.6).contains(&vpd) {
            VpdZone::HighTranspiration
        } else {
            VpdZone::Danger
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VpdZone::LowTranspiration => "low_transpiration",
            VpdZone::Healthy => "healthy",
            VpdZone::HighTranspiration => "high_transpiration",
            VpdZone::Danger => "danger",
        }
    }
}

impl fmt::Display for VpdZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
