//! Model routing: selection, fallback, and the [`ModelRouter`] facade.

mod fallback;
mod selector;

pub use fallback::FallbackOrchestrator;
pub use selector::ModelSelector;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::RouterSettings;
use crate::generation::{GeminiInvoker, GenerationInvoker, GenerationRequest};
use crate::models::{ModelDescriptor, ModelId, ModelRegistry};
use crate::observability::{MetricsRegistry, MetricsSummary};
use crate::usage::{Clock, ModelStatus, SystemClock, UsageRecord, UsageTracker};
use crate::{Error, Result};

/// Status view for operators: per-model quota rows plus request metrics.
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub generated_at: DateTime<Utc>,
    pub models: Vec<ModelStatus>,
    pub metrics: MetricsSummary,
}

impl RouterStatus {
    pub fn available_models(&self) -> usize {
        self.models.iter().filter(|m| m.is_available).count()
    }
}

/// Shared entry point for all generation flows.
///
/// Cloning is cheap; clones share usage counters and metrics.
#[derive(Clone)]
pub struct ModelRouter {
    tracker: Arc<UsageTracker>,
    invoker: Arc<dyn GenerationInvoker>,
    orchestrator: FallbackOrchestrator,
    metrics: Arc<MetricsRegistry>,
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRouter")
            .field("invoker", &self.invoker.name())
            .field("models", &self.tracker.registry().len())
            .finish()
    }
}

impl ModelRouter {
    pub fn builder() -> ModelRouterBuilder {
        ModelRouterBuilder::default()
    }

    /// Runs `request` with fallback and decodes the structured answer.
    ///
    /// An answer that does not decode into `T` is a non-rate-limit failure:
    /// it is not retried and no usage is recorded.
    pub async fn generate<T: DeserializeOwned>(&self, request: &GenerationRequest) -> Result<T> {
        let invoker = &self.invoker;
        self.orchestrator
            .run_labeled(request.flow, |model| async move {
                let value = invoker.invoke(&model, request).await?;
                serde_json::from_value(value).map_err(|e| {
                    Error::MalformedOutput(format!(
                        "{} output from {} did not match schema: {}",
                        request.flow, model, e
                    ))
                })
            })
            .await
    }

    /// Runs an arbitrary job through selection and fallback.
    pub async fn run_with_fallback<T, F, Fut>(&self, job: F) -> Result<T>
    where
        F: FnMut(ModelId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.orchestrator.run_with_fallback(job).await
    }

    pub fn select_model(&self) -> ModelId {
        self.orchestrator.selector().select_model()
    }

    pub fn usage(&self, model: &str) -> UsageRecord {
        self.tracker.get_usage(model)
    }

    pub fn snapshot(&self) -> Vec<ModelStatus> {
        self.tracker.snapshot()
    }

    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            generated_at: self.tracker.now(),
            models: self.tracker.snapshot(),
            metrics: MetricsSummary::from_registry(&self.metrics),
        }
    }

    pub fn reset_usage(&self) {
        self.tracker.reset_all();
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.tracker.registry()
    }

    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }

    pub fn invoker(&self) -> &Arc<dyn GenerationInvoker> {
        &self.invoker
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }
}

/// Builder for [`ModelRouter`].
///
/// Explicit components win over [`RouterSettings`]; settings fill in the
/// registry and the Gemini invoker when they are not given directly.
#[derive(Default)]
pub struct ModelRouterBuilder {
    registry: Option<ModelRegistry>,
    models: Option<Vec<ModelDescriptor>>,
    clock: Option<Arc<dyn Clock>>,
    tracker: Option<Arc<UsageTracker>>,
    invoker: Option<Arc<dyn GenerationInvoker>>,
    metrics: Option<Arc<MetricsRegistry>>,
    settings: Option<RouterSettings>,
}

impl ModelRouterBuilder {
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validated at [`build`](Self::build).
    pub fn models(mut self, models: Vec<ModelDescriptor>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Shares counters with another router. Overrides `registry`, `models`
    /// and `clock`.
    pub fn tracker(mut self, tracker: Arc<UsageTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn invoker(mut self, invoker: impl GenerationInvoker + 'static) -> Self {
        self.invoker = Some(Arc::new(invoker));
        self
    }

    pub fn invoker_arc(mut self, invoker: Arc<dyn GenerationInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(mut self, settings: RouterSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<ModelRouter> {
        let tracker = match self.tracker {
            Some(tracker) => tracker,
            None => {
                let registry = match (self.registry, self.models) {
                    (Some(registry), _) => registry,
                    (None, Some(models)) => ModelRegistry::new(models)?,
                    (None, None) => match &self.settings {
                        Some(settings) => settings.registry()?,
                        None => ModelRegistry::builtin(),
                    },
                };
                let clock = self
                    .clock
                    .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
                Arc::new(UsageTracker::with_clock(Arc::new(registry), clock))
            }
        };

        let invoker: Arc<dyn GenerationInvoker> = match (self.invoker, &self.settings) {
            (Some(invoker), _) => invoker,
            (None, Some(settings)) => Arc::new(GeminiInvoker::from_settings(&settings.gemini)?),
            (None, None) => {
                return Err(Error::Config(
                    "ModelRouter requires an invoker or settings".into(),
                ));
            }
        };

        let metrics = self.metrics.unwrap_or_default();
        let orchestrator = FallbackOrchestrator::with_metrics(tracker.clone(), metrics.clone());

        tracing::debug!(
            invoker = invoker.name(),
            models = tracker.registry().len(),
            "model router built"
        );

        Ok(ModelRouter {
            tracker,
            invoker,
            orchestrator,
            metrics,
        })
    }
}
