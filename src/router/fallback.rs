//! One-shot fallback for rate-limited generations.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use super::selector::ModelSelector;
use crate::models::ModelId;
use crate::observability::{AttemptOutcome, MetricsRegistry, SpanContext};
use crate::usage::UsageTracker;
use crate::{Error, Result};

/// Runs a generation job against a selected model, retrying once on a
/// different model when the first attempt is rate limited.
#[derive(Debug, Clone)]
pub struct FallbackOrchestrator {
    selector: ModelSelector,
    tracker: Arc<UsageTracker>,
    metrics: Arc<MetricsRegistry>,
}

impl FallbackOrchestrator {
    pub fn new(tracker: Arc<UsageTracker>) -> Self {
        Self::with_metrics(tracker, Arc::new(MetricsRegistry::default()))
    }

    pub fn with_metrics(tracker: Arc<UsageTracker>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            selector: ModelSelector::new(tracker.clone()),
            tracker,
            metrics,
        }
    }

    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub async fn run_with_fallback<T, F, Fut>(&self, job: F) -> Result<T>
    where
        F: FnMut(ModelId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_labeled("generation", job).await
    }

    /// Same as [`run_with_fallback`](Self::run_with_fallback) with `flow`
    /// attached to the request span.
    ///
    /// Makes at most two attempts. Usage is recorded only for the attempt
    /// that succeeds.
    pub async fn run_labeled<T, F, Fut>(&self, flow: &'static str, mut job: F) -> Result<T>
    where
        F: FnMut(ModelId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let context = SpanContext::new(flow);
        let request_span = context.request_span();
        let started = Instant::now();

        let _active = self.metrics.record_request_start();
        let result = self
            .run_attempts(&context, &mut job)
            .instrument(request_span.clone())
            .await;
        self.metrics.record_request_end(result.is_ok(), started.elapsed());

        request_span.record("outcome", outcome_label(&result));
        result
    }

    async fn run_attempts<T, F, Fut>(&self, context: &SpanContext, job: &mut F) -> Result<T>
    where
        F: FnMut(ModelId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let first = self.selector.select_model();
        let error = match self.attempt(context, job, &first, 1).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() => e,
            Err(e) => return Err(e),
        };

        let Some(second) = self.selector.select_model_excluding(&[first.as_str()]) else {
            tracing::error!(model = %first, "rate limited with no alternative model");
            self.metrics.record_exhausted();
            return Err(Error::AllModelsExhausted {
                source: Box::new(error),
            });
        };

        tracing::warn!(
            from = %first,
            to = %second,
            error = %error,
            "model rate limited, falling back"
        );
        self.metrics.record_fallback();

        self.attempt(context, job, &second, 2).await.map_err(|e| {
            tracing::error!(model = %second, error = %e, "fallback attempt failed");
            self.metrics.record_exhausted();
            Error::AllModelsExhausted {
                source: Box::new(e),
            }
        })
    }

    async fn attempt<T, F, Fut>(
        &self,
        context: &SpanContext,
        job: &mut F,
        model: &ModelId,
        attempt: u32,
    ) -> Result<T>
    where
        F: FnMut(ModelId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let span = context.attempt_span(model, attempt);
        let result = job(model.clone()).instrument(span.span().clone()).await;

        let outcome = AttemptOutcome::of(&result);
        let latency_ms = span.finish(outcome == AttemptOutcome::RateLimited);
        self.metrics.record_attempt(model, outcome);

        match &result {
            Ok(_) => {
                self.tracker.record_usage(model);
                tracing::info!(model = %model, attempt, latency_ms, "generation succeeded");
            }
            Err(e) => {
                tracing::debug!(model = %model, attempt, error = %e, "attempt failed");
            }
        }
        result
    }
}

fn outcome_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) if e.is_exhausted() => "exhausted",
        Err(e) if e.is_rate_limited() => "rate_limited",
        Err(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::models::{ModelDescriptor, ModelRegistry};
    use crate::usage::ManualClock;

    fn orchestrator(models: &[(&str, u32)]) -> (FallbackOrchestrator, Arc<UsageTracker>) {
        let models = models
            .iter()
            .map(|(id, max)| ModelDescriptor::new(*id, *id, *max, Duration::from_secs(60)))
            .collect();
        let registry = Arc::new(ModelRegistry::new(models).unwrap());
        let tracker = Arc::new(UsageTracker::with_clock(
            registry,
            Arc::new(ManualClock::default()),
        ));
        (FallbackOrchestrator::new(tracker.clone()), tracker)
    }

    #[tokio::test]
    async fn test_success_records_usage_once() {
        let (orchestrator, tracker) = orchestrator(&[("a", 5), ("b", 5)]);
        let mut calls = Vec::new();

        let result = orchestrator
            .run_with_fallback(|model| {
                calls.push(model);
                async { Ok::<_, Error>(json!({"ok": true})) }
            })
            .await
            .unwrap();

        assert_eq!(result, json!({"ok": true}));
        assert_eq!(calls, vec!["a".to_string()]);
        assert_eq!(tracker.get_usage("a").count, 1);
        assert_eq!(tracker.get_usage("b").count, 0);
    }

    #[tokio::test]
    async fn test_rate_limited_falls_back_to_next_model() {
        let (orchestrator, tracker) = orchestrator(&[("a", 5), ("b", 5)]);
        let mut calls = Vec::new();

        let result = orchestrator
            .run_with_fallback(|model| {
                calls.push(model.clone());
                async move {
                    if model == "a" {
                        Err(Error::rate_limited("a"))
                    } else {
                        Ok(json!({"title": "X", "poem": "Y"}))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result["title"], "X");
        assert_eq!(result["poem"], "Y");
        assert_eq!(calls, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tracker.get_usage("a").count, 0);
        assert_eq!(tracker.get_usage("b").count, 1);

        let metrics = orchestrator.metrics();
        assert_eq!(metrics.fallbacks.get(), 1);
        assert_eq!(metrics.attempts_total.get(), 2);
        assert_eq!(metrics.attempts_rate_limited.get(), 1);

        let summary = crate::MetricsSummary::from_registry(metrics);
        assert_eq!(summary.models["a"].rate_limited, 1);
        assert_eq!(summary.models["b"].successes, 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let (orchestrator, tracker) = orchestrator(&[("a", 5), ("b", 5)]);
        let mut attempts = 0;

        let err = orchestrator
            .run_with_fallback(|_| {
                attempts += 1;
                async {
                    Err::<Value, _>(Error::Api {
                        message: "bad request".into(),
                        status: Some(400),
                        error_type: None,
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts, 1);
        assert!(matches!(err, Error::Api { status: Some(400), .. }));
        assert_eq!(tracker.get_usage("a").count, 0);
        assert_eq!(orchestrator.metrics().fallbacks.get(), 0);
    }

    #[tokio::test]
    async fn test_single_model_rate_limited_is_exhausted_without_retry() {
        let (orchestrator, tracker) = orchestrator(&[("a", 5)]);
        let mut attempts = 0;

        let err = orchestrator
            .run_with_fallback(|model| {
                attempts += 1;
                async move { Err::<Value, _>(Error::rate_limited(model)) }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts, 1);
        assert!(err.is_exhausted());
        assert_eq!(err.status_code(), Some(429));
        match err {
            Error::AllModelsExhausted { source } => {
                assert!(matches!(*source, Error::RateLimited { ref model, .. } if model == "a"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tracker.get_usage("a").count, 0);
        assert_eq!(orchestrator.metrics().exhausted.get(), 1);
    }

    #[tokio::test]
    async fn test_alternatives_at_capacity_is_exhausted_without_retry() {
        let (orchestrator, tracker) = orchestrator(&[("a", 5), ("b", 1)]);
        tracker.record_usage("b");
        let mut attempts = 0;

        let err = orchestrator
            .run_with_fallback(|model| {
                attempts += 1;
                async move { Err::<Value, _>(Error::rate_limited(model)) }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts, 1);
        assert!(err.is_exhausted());
    }

    #[tokio::test]
    async fn test_capped_first_model_is_not_a_fallback_target() {
        let (orchestrator, tracker) = orchestrator(&[("a", 1), ("b", 5)]);
        tracker.record_usage("a");
        let mut calls = Vec::new();

        let err = orchestrator
            .run_with_fallback(|model| {
                calls.push(model.clone());
                async move {
                    if model == "b" {
                        Err::<Value, _>(Error::rate_limited("b"))
                    } else {
                        Ok(json!({"ok": true}))
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, vec!["b".to_string()]);
        assert!(err.is_exhausted());
        assert_eq!(tracker.get_usage("a").count, 1);
        assert_eq!(tracker.get_usage("b").count, 0);
        assert_eq!(orchestrator.metrics().fallbacks.get(), 0);
    }

    #[tokio::test]
    async fn test_second_failure_wraps_second_error() {
        let (orchestrator, tracker) = orchestrator(&[("a", 5), ("b", 5)]);
        let mut calls = Vec::new();

        let err = orchestrator
            .run_with_fallback(|model| {
                calls.push(model.clone());
                async move {
                    if model == "a" {
                        Err::<Value, _>(Error::rate_limited("a"))
                    } else {
                        Err(Error::Timeout(Duration::from_secs(60)))
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.len(), 2);
        match err {
            Error::AllModelsExhausted { source } => {
                assert!(matches!(*source, Error::Timeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tracker.get_usage("a").count, 0);
        assert_eq!(tracker.get_usage("b").count, 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_leaves_in_flight_gauge() {
        let (orchestrator, tracker) = orchestrator(&[("a", 5)]);

        let run = orchestrator.run_with_fallback(|_| std::future::pending::<Result<Value>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), run).await;

        assert!(timed_out.is_err());
        assert_eq!(orchestrator.metrics().requests_total.get(), 1);
        assert_eq!(orchestrator.metrics().active_requests.get(), 0);
        assert_eq!(tracker.get_usage("a").count, 0);
    }

    #[tokio::test]
    async fn test_request_metrics() {
        let (orchestrator, _) = orchestrator(&[("a", 5)]);

        let _ = orchestrator
            .run_labeled("poem", |_| async { Ok::<_, Error>(1) })
            .await;
        let _ = orchestrator
            .run_labeled("poem", |_| async {
                Err::<i32, _>(Error::InvalidRequest("empty".into()))
            })
            .await;

        let metrics = orchestrator.metrics();
        assert_eq!(metrics.requests_total.get(), 2);
        assert_eq!(metrics.requests_success.get(), 1);
        assert_eq!(metrics.requests_error.get(), 1);
        assert_eq!(metrics.active_requests.get(), 0);
    }
}
