//! Structured span definitions for tracing.

use std::time::Instant;

use tracing::{Level, Span, field, span};
use uuid::Uuid;

/// Creates spans for one logical generation request.
pub struct SpanContext {
    request_id: Uuid,
    flow: &'static str,
}

impl SpanContext {
    pub fn new(flow: &'static str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            flow,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn request_span(&self) -> Span {
        span!(
            Level::INFO,
            "generation.request",
            request_id = %self.request_id,
            flow = self.flow,
            outcome = field::Empty,
        )
    }

    pub fn attempt_span(&self, model: &str, attempt: u32) -> AttemptSpan {
        AttemptSpan::new(self, model, attempt)
    }
}

/// Tracks one model invocation within a request.
pub struct AttemptSpan {
    span: Span,
    start: Instant,
}

impl AttemptSpan {
    fn new(context: &SpanContext, model: &str, attempt: u32) -> Self {
        let span = span!(
            Level::INFO,
            "generation.attempt",
            request_id = %context.request_id,
            flow = context.flow,
            model = model,
            attempt = attempt,
            rate_limited = field::Empty,
            latency_ms = field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Returns elapsed milliseconds.
    pub fn finish(self, rate_limited: bool) -> f64 {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.span.record("rate_limited", rate_limited);
        self.span.record("latency_ms", latency_ms as u64);
        latency_ms
    }
}
