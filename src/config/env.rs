//! Environment variable provider.

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

pub const DEFAULT_ENV_PREFIX: &str = "VERSE_";

/// Read-only view of the process environment.
///
/// `gemini.api_key` maps to `VERSE_GEMINI_API_KEY` with the default prefix.
/// Writes are rejected: mutating the environment is not thread-safe.
#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    prefix: String,
}

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self::prefixed(DEFAULT_ENV_PREFIX)
    }

    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }

    fn key_for(&self, var: &str) -> Option<String> {
        var.strip_prefix(&self.prefix)
            .map(|rest| rest.to_lowercase().replace('_', "."))
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn read_only() -> ConfigError {
    ConfigError::Provider {
        message: "environment variables are read-only".into(),
    }
}

#[async_trait::async_trait]
impl ConfigProvider for EnvConfigProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        match std::env::var(self.var_name(key)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    async fn set_raw(&self, _key: &str, _value: &str) -> ConfigResult<()> {
        Err(read_only())
    }

    async fn delete(&self, _key: &str) -> ConfigResult<bool> {
        Err(read_only())
    }

    /// Underscores in variable names are ambiguous, so `GEMINI_API_KEY`
    /// lists as `gemini.api.key`.
    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let wanted = self.var_name(prefix);
        Ok(std::env::vars()
            .filter(|(name, _)| name.starts_with(&wanted))
            .filter_map(|(name, _)| self.key_for(&name))
            .collect())
    }
}
