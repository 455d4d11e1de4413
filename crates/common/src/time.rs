//! Millisecond timestamps exchanged with callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A media time in milliseconds.
///
/// Conversions from [`Duration`] round to the nearest millisecond, so a
/// duration of 1.5 ms reads back as 2 ms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Millis(pub i64);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> i64 {
        self.0
    }

    /// Convert from a duration, rounding to the nearest millisecond.
    pub fn from_duration(duration: Duration) -> Self {
        let micros = duration.as_micros().saturating_add(500);
        Self(i64::try_from(micros / 1000).unwrap_or(i64::MAX))
    }

    /// Convert to a duration; negative values clamp to zero.
    pub fn to_duration(self) -> Duration {
        Duration::from_millis(self.0.max(0) as u64)
    }
}

impl From<Duration> for Millis {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.max(0);
        let hours = total / 3_600_000;
        let minutes = (total / 60_000) % 60;
        let seconds = (total / 1000) % 60;
        let millis = total % 1000;
        if hours > 0 {
            write!(f, "{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
        } else {
            write!(f, "{:02}:{:02}.{:03}", minutes, seconds, millis)
        }
    }
}
