use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::stage::StageConfig;

/// Bookkeeping for the periodic forced-ventilation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirExchangeWindow {
    pub last_exchange_at: DateTime<Utc>,
}

impl AirExchangeWindow {
    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self {
            last_exchange_at: at,
        }
    }

    /// The window after a hold that ended at `ended_at`.
    pub fn completed(self, ended_at: DateTime<Utc>) -> Self {
        Self {
            last_exchange_at: ended_at,
        }
    }

    fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_exchange_at).to_std().unwrap_or_default()
    }
}

/// Decide whether a vent is due. The window is returned unchanged; the
/// caller replaces it with [`AirExchangeWindow::completed`] once the hold ends.
pub fn should_vent(
    now: DateTime<Utc>,
    window: &AirExchangeWindow,
    stage: &StageConfig,
) -> (bool, AirExchangeWindow) {
    (window.elapsed(now) >= stage.air_exchange_interval(), *window)
}

/// True while `now` falls inside `[interval, interval + duration)` after the
/// last exchange.
pub fn is_active(now: DateTime<Utc>, window: &AirExchangeWindow, stage: &StageConfig) -> bool {
    let elapsed = window.elapsed(now);
    let start = stage.air_exchange_interval();
    elapsed >= start && elapsed < start + stage.air_exchange_duration()
}

/// Time left before the next vent is due; zero when it is already due.
pub fn time_until_next(
    now: DateTime<Utc>,
    window: &AirExchangeWindow,
    stage: &StageConfig,
) -> Duration {
    stage
        .air_exchange_interval()
        .saturating_sub(window.elapsed(now))
}
