use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock time derived from tokio's monotonic clock.
///
/// Anchored once, then advanced by `Instant` so that a paused tokio runtime
/// drives the controller's notion of "now" as well as its sleeps.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            mono: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.mono.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
