//! # verse-router
//!
//! Multi-model generation router for image-to-poem flows.
//!
//! Requests are routed to the first registered model with quota left in its
//! current window. A rate-limited attempt is retried once on the next
//! available model; any other failure is returned unchanged.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use verse_router::flows::poem::{PoemRequest, generate_poem};
//! use verse_router::{GeminiInvoker, InlineImage, ModelRouter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), verse_router::Error> {
//!     let router = ModelRouter::builder()
//!         .invoker(GeminiInvoker::from_env()?)
//!         .build()?;
//!
//!     let image = InlineImage::from_path("sunset.jpg").await?;
//!     let poem = generate_poem(&router, PoemRequest::new(image).form("haiku")).await?;
//!     println!("{}\n\n{}", poem.title, poem.poem);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod flows;
pub mod generation;
pub mod models;
pub mod observability;
pub mod router;
pub mod usage;

pub use config::{
    CompositeConfigProvider, ConfigBuilder, ConfigError, ConfigProvider, ConfigProviderExt,
    EnvConfigProvider, FileConfigProvider, GeminiSettings, MemoryConfigProvider, RouterSettings,
};
pub use generation::{
    Content, GeminiInvoker, GenerationInvoker, GenerationRequest, InlineImage, output_schema,
};
pub use models::{ModelDescriptor, ModelId, ModelRegistry};
pub use observability::{
    AttemptOutcome, MetricsRegistry, MetricsSummary, ModelMetrics, SpanContext,
};
pub use router::{
    FallbackOrchestrator, ModelRouter, ModelRouterBuilder, ModelSelector, RouterStatus,
};
pub use usage::{
    Clock, ManualClock, ModelStatus, SystemClock, UsageRecord, UsageTracker, reconcile,
};

use std::time::Duration;

/// Error type for routing and generation.
///
/// Provider failures are classified once, at the invoker edge: only
/// [`Error::RateLimited`] triggers a fallback attempt.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Provider reported capacity exhaustion for this model.
    #[error("Model {model} is rate limited{}", match retry_after {
        Some(d) => format!(", retry in {:.0}s", d.as_secs_f64()),
        None => String::new(),
    })]
    RateLimited {
        model: String,
        retry_after: Option<Duration>,
    },

    /// Rate limited with no alternative model, or the fallback attempt failed too.
    #[error("All models exhausted: {source}")]
    AllModelsExhausted { source: Box<Error> },

    /// Provider returned a non-rate-limit error response.
    #[error("API error (HTTP {status}): {message}", status = status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into()))]
    Api {
        message: String,
        status: Option<u16>,
        error_type: Option<String>,
    },

    /// Network connectivity or request failed.
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Model answered, but not with the expected structured output.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// Request parameters are invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Operation exceeded timeout.
    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Provider capacity exhausted (429 / resource exhausted)
    RateLimit,
    /// Configuration or setup errors, fatal at startup
    Configuration,
    /// Network or server errors that may succeed later
    Transient,
    /// Caller supplied bad input
    InvalidInput,
    /// Malformed output, IO, JSON, unexpected states
    Internal,
}

impl Error {
    pub fn rate_limited(model: impl Into<String>) -> Self {
        Error::RateLimited {
            model: model.into(),
            retry_after: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::RateLimited { .. } | Error::AllModelsExhausted { .. } => {
                ErrorCategory::RateLimit
            }

            Error::Config(_) => ErrorCategory::Configuration,

            Error::Network(_) | Error::Timeout(_) => ErrorCategory::Transient,
            Error::Api {
                status: Some(500..=599),
                ..
            } => ErrorCategory::Transient,

            Error::InvalidRequest(_) => ErrorCategory::InvalidInput,
            Error::Api {
                status: Some(400..=499),
                ..
            } => ErrorCategory::InvalidInput,

            Error::Api { .. } | Error::Json(_) | Error::MalformedOutput(_) | Error::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Only this condition makes the orchestrator try another model.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::AllModelsExhausted { .. })
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => *status,
            Error::RateLimited { .. } => Some(429),
            Error::AllModelsExhausted { source } => source.status_code(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            Error::AllModelsExhausted { source } => source.retry_after(),
            _ => None,
        }
    }

    /// Message class shown to end users.
    pub fn user_message(&self) -> &'static str {
        match self.category() {
            ErrorCategory::RateLimit => {
                "The poem service is busy right now. Please try again shortly."
            }
            ErrorCategory::InvalidInput => {
                "That request could not be processed. Please check the image or text and try again."
            }
            _ => "Something went wrong while generating. Please try again.",
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound { key } => {
                Error::Config(format!("Key not found: {}", key))
            }
            config::ConfigError::InvalidValue { key, message } => {
                Error::Config(format!("Invalid value for {}: {}", key, message))
            }
            config::ConfigError::Serialization(e) => Error::Json(e),
            config::ConfigError::Io(e) => Error::Io(e),
            config::ConfigError::Env(e) => Error::Config(e.to_string()),
            config::ConfigError::Provider { message } => Error::Config(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
