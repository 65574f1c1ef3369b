//! # Time Window Calculator
//!
//! Each poll reads rows whose `created_at` falls inside `[lower, upper)`.
//! `lower` trails the poll instant by the configured lookback; `upper` leads
//! it by a small forward skew so rows stamped by a data source whose clock
//! runs slightly ahead are still picked up.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{RelayError, RelayResult};

/// Default lookback: thirty days.
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Default forward skew: one minute.
pub const DEFAULT_FORWARD_SKEW: Duration = Duration::from_secs(60);
/// Upper limit for either bound offset: one hundred years.
pub const MAX_WINDOW_OFFSET: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A half-open `[lower, upper)` range of timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub lower: DateTime<Utc>,
    pub upper: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.lower <= ts && ts < self.upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCalculator {
    lookback: TimeDelta,
    forward_skew: TimeDelta,
}

impl Default for WindowCalculator {
    fn default() -> Self {
        Self {
            lookback: TimeDelta::seconds(DEFAULT_LOOKBACK.as_secs() as i64),
            forward_skew: TimeDelta::seconds(DEFAULT_FORWARD_SKEW.as_secs() as i64),
        }
    }
}

impl WindowCalculator {
    /// Creates a calculator; the window may not be empty.
    pub fn new(lookback: Duration, forward_skew: Duration) -> RelayResult<Self> {
        let to_delta = |d: Duration, what: &str| {
            if d > MAX_WINDOW_OFFSET {
                return Err(RelayError::Configuration(format!(
                    "{} of {:?} exceeds the maximum of {:?}",
                    what, d, MAX_WINDOW_OFFSET
                )));
            }
            TimeDelta::from_std(d)
                .map_err(|_| RelayError::Configuration(format!("{} of {:?} is out of range", what, d)))
        };
        let lookback = to_delta(lookback, "lookback")?;
        let forward_skew = to_delta(forward_skew, "forward skew")?;

        if (lookback + forward_skew) <= TimeDelta::zero() {
            return Err(RelayError::Configuration(
                "lookback and forward skew are both zero; the poll window would be empty".to_string(),
            ));
        }

        Ok(Self { lookback, forward_skew })
    }

    /// The window for a poll taking place at `now`.
    ///
    /// Bounds saturate at the limits of `DateTime<Utc>`.
    pub fn at(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow {
            lower: now.checked_sub_signed(self.lookback).unwrap_or(DateTime::<Utc>::MIN_UTC),
            upper: now.checked_add_signed(self.forward_skew).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// The window for a poll taking place right now.
    pub fn now(&self) -> TimeWindow {
        self.at(Utc::now())
    }

    pub fn lookback(&self) -> TimeDelta {
        self.lookback
    }

    pub fn forward_skew(&self) -> TimeDelta {
        self.forward_skew
    }
}
