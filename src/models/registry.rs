use std::collections::HashSet;

use super::builtin;
use super::descriptor::ModelDescriptor;
use crate::{Error, Result};

/// Ordered, immutable list of models. Order is selection priority.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Validates the descriptors; an empty list is a configuration error.
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::Config("model registry is empty".into()));
        }

        let mut seen = HashSet::with_capacity(models.len());
        for model in &models {
            model.validate().map_err(Error::Config)?;
            if !seen.insert(model.id.as_str()) {
                return Err(Error::Config(format!("duplicate model id: {}", model.id)));
            }
        }

        tracing::debug!(
            models = ?models.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "model registry initialized"
        );

        Ok(Self { models })
    }

    pub fn builtin() -> Self {
        Self {
            models: builtin::models(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Never fails: construction rejects empty registries.
    pub fn first(&self) -> &ModelDescriptor {
        &self.models[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
