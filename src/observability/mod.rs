//! Observability: structured tracing spans and router metrics.
//!
//! Enable the `subscriber` feature to install a formatting subscriber:
//!
//! ```toml
//! verse-router = { version = "0.1", features = ["subscriber"] }
//! ```
//!
//! ```rust,ignore
//! verse_router::observability::init_tracing_subscriber("verse_router=debug")?;
//! ```

mod metrics;
mod spans;

pub use metrics::{
    ActiveRequest, AttemptOutcome, Counter, Gauge, LatencyHistogram, MetricsRegistry,
    MetricsSummary, ModelMetrics,
};
pub use spans::{AttemptSpan, SpanContext};

/// Installs a global `fmt` subscriber. `RUST_LOG` wins over `default_filter`.
#[cfg(feature = "subscriber")]
pub fn init_tracing_subscriber(default_filter: &str) -> crate::Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| crate::Error::Config(format!("invalid tracing filter: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| crate::Error::Config(format!("tracing subscriber already set: {}", e)))
}
