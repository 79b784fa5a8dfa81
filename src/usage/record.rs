use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Requests observed for one model in its current quota window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl UsageRecord {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    pub(crate) fn incremented(self) -> Self {
        Self {
            count: self.count.saturating_add(1),
            ..self
        }
    }
}

/// Resets the record when its window has elapsed.
///
/// A `window_start` later than `now` (clock stepped backwards) counts as
/// not yet expired.
pub fn reconcile(record: UsageRecord, now: DateTime<Utc>, interval: Duration) -> UsageRecord {
    let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
    if now.signed_duration_since(record.window_start) >= interval {
        UsageRecord::fresh(now)
    } else {
        record
    }
}
