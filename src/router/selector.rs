use std::sync::Arc;

use crate::models::ModelId;
use crate::usage::UsageTracker;

/// First-fit model choice in registry order.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    tracker: Arc<UsageTracker>,
}

impl ModelSelector {
    pub fn new(tracker: Arc<UsageTracker>) -> Self {
        Self { tracker }
    }

    /// Returns the first model under its cap, or the first registered model
    /// when every model is exhausted. The caller then attempts it anyway and
    /// lets the provider decide.
    pub fn select_model(&self) -> ModelId {
        self.select_model_excluding(&[]).unwrap_or_else(|| {
            let last_resort = self.tracker.registry().first();
            tracing::warn!(
                model = %last_resort.id,
                "all models at capacity, using first registered model"
            );
            last_resort.id.clone()
        })
    }

    /// First model under its cap that is not in `excluded`. `None` when no
    /// such model exists; there is no last-resort pick here.
    pub fn select_model_excluding(&self, excluded: &[&str]) -> Option<ModelId> {
        let descriptor = self
            .tracker
            .registry()
            .iter()
            .filter(|d| !excluded.contains(&d.id.as_str()))
            .find(|d| self.tracker.is_available(d))?;

        tracing::debug!(
            model = %descriptor.id,
            max = descriptor.max_requests,
            "model selected"
        );
        Some(descriptor.id.clone())
    }
}
