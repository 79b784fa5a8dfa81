//! Request and per-model attempt metrics for the status view.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Upper bounds (ms) of the latency buckets; one overflow bucket follows.
const LATENCY_BOUNDS_MS: [u64; 8] = [250, 500, 1_000, 2_500, 5_000, 10_000, 20_000, 40_000];

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket latency distribution of whole requests, fallback included.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BOUNDS_MS.len() + 1],
    total_micros: AtomicU64,
    count: AtomicU64,
}

impl LatencyHistogram {
    pub fn record(&self, latency: Duration) {
        let ms = latency.as_millis() as u64;
        let bucket = LATENCY_BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(LATENCY_BOUNDS_MS.len());
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total_micros.load(Ordering::Relaxed) as f64 / 1000.0 / n as f64,
        }
    }

    /// Upper bound of the bucket holding quantile `q` (0.0..=1.0). Falls
    /// in the overflow bucket as `None`.
    pub fn quantile_bound_ms(&self, q: f64) -> Option<u64> {
        let counts: Vec<u64> = self
            .buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return Some(0);
        }

        let rank = ((total as f64) * q.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (index, count) in counts.iter().enumerate() {
            seen += count;
            if seen >= rank {
                return LATENCY_BOUNDS_MS.get(index).copied();
            }
        }
        None
    }
}

/// How a single model invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    Failed,
}

impl AttemptOutcome {
    pub fn of<T>(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) if e.is_rate_limited() => Self::RateLimited,
            Err(_) => Self::Failed,
        }
    }
}

#[derive(Debug, Default)]
struct ModelCounters {
    attempts: Counter,
    successes: Counter,
    rate_limited: Counter,
    failures: Counter,
}

/// Router-wide metrics. A logical request makes one or two attempts and
/// both levels are counted.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    pub requests_total: Counter,
    pub requests_success: Counter,
    pub requests_error: Counter,
    pub active_requests: Gauge,
    pub attempts_total: Counter,
    pub attempts_rate_limited: Counter,
    pub fallbacks: Counter,
    pub exhausted: Counter,
    pub request_latency: LatencyHistogram,
    per_model: DashMap<String, ModelCounters>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the request and holds it in flight until the guard drops.
    pub fn record_request_start(&self) -> ActiveRequest<'_> {
        self.requests_total.inc();
        self.active_requests.inc();
        ActiveRequest {
            gauge: &self.active_requests,
        }
    }

    pub fn record_request_end(&self, success: bool, latency: Duration) {
        self.request_latency.record(latency);
        if success {
            self.requests_success.inc();
        } else {
            self.requests_error.inc();
        }
    }

    pub fn record_attempt(&self, model: &str, outcome: AttemptOutcome) {
        self.attempts_total.inc();

        let counters = self.per_model.entry(model.to_string()).or_default();
        counters.attempts.inc();
        match outcome {
            AttemptOutcome::Success => counters.successes.inc(),
            AttemptOutcome::RateLimited => {
                counters.rate_limited.inc();
                self.attempts_rate_limited.inc();
            }
            AttemptOutcome::Failed => counters.failures.inc(),
        }
    }

    pub fn record_fallback(&self) {
        self.fallbacks.inc();
    }

    pub fn record_exhausted(&self) {
        self.exhausted.inc();
    }
}

/// One slot of [`MetricsRegistry::active_requests`]. Released on drop,
/// including when the request future is cancelled.
#[derive(Debug)]
#[must_use = "the request leaves the in-flight gauge when this is dropped"]
pub struct ActiveRequest<'a> {
    gauge: &'a Gauge,
}

impl Drop for ActiveRequest<'_> {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelMetrics {
    pub attempts: u64,
    pub successes: u64,
    pub rate_limited: u64,
    pub failures: u64,
}

/// Point-in-time copy of a [`MetricsRegistry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub in_flight: i64,
    pub total_attempts: u64,
    pub rate_limited_attempts: u64,
    pub fallbacks: u64,
    pub exhausted: u64,
    pub avg_latency_ms: f64,
    /// Bucket bound; `None` when beyond the largest bucket.
    pub p95_latency_ms: Option<u64>,
    pub models: BTreeMap<String, ModelMetrics>,
}

impl MetricsSummary {
    pub fn from_registry(registry: &MetricsRegistry) -> Self {
        let models = registry
            .per_model
            .iter()
            .map(|entry| {
                let c = entry.value();
                let metrics = ModelMetrics {
                    attempts: c.attempts.get(),
                    successes: c.successes.get(),
                    rate_limited: c.rate_limited.get(),
                    failures: c.failures.get(),
                };
                (entry.key().clone(), metrics)
            })
            .collect();

        Self {
            total_requests: registry.requests_total.get(),
            successful_requests: registry.requests_success.get(),
            failed_requests: registry.requests_error.get(),
            in_flight: registry.active_requests.get(),
            total_attempts: registry.attempts_total.get(),
            rate_limited_attempts: registry.attempts_rate_limited.get(),
            fallbacks: registry.fallbacks.get(),
            exhausted: registry.exhausted.get(),
            avg_latency_ms: registry.request_latency.mean_ms(),
            p95_latency_ms: registry.request_latency.quantile_bound_ms(0.95),
            models,
        }
    }
}
