//! Time-windowed request counters per model.

mod clock;
mod record;
mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use record::{UsageRecord, reconcile};
pub use tracker::{ModelStatus, UsageTracker};
