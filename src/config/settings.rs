//! Typed router settings resolved from a [`ConfigProvider`].

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::provider::{ConfigProvider, ConfigProviderExt};
use super::{ConfigError, ConfigResult};
use crate::Result;
use crate::generation::gemini::{BASE_URL, DEFAULT_TIMEOUT};
use crate::models::{ModelDescriptor, ModelRegistry};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Clone)]
pub struct GeminiSettings {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl GeminiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Everything needed to build a [`ModelRouter`](crate::ModelRouter).
///
/// | key | default |
/// |---|---|
/// | `gemini.api_key` | none, required by the Gemini invoker |
/// | `gemini.base_url` | `https://generativelanguage.googleapis.com` |
/// | `gemini.timeout_secs` | `60` |
/// | `models` | builtin Gemini list |
#[derive(Debug, Clone, Default)]
pub struct RouterSettings {
    pub gemini: GeminiSettings,
    pub models: Option<Vec<ModelDescriptor>>,
}

impl RouterSettings {
    pub async fn load(provider: &dyn ConfigProvider) -> ConfigResult<Self> {
        let defaults = GeminiSettings::default();

        let api_key = provider
            .get_raw("gemini.api_key")
            .await?
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        let base_url = provider
            .get_raw("gemini.base_url")
            .await?
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let timeout_secs = match provider.get_raw("gemini.timeout_secs").await? {
            Some(raw) => parse_timeout(&raw)?,
            None => defaults.timeout_secs,
        };
        let models: Option<Vec<ModelDescriptor>> = provider.get("models").await?;

        tracing::debug!(
            source = provider.name(),
            has_api_key = api_key.is_some(),
            base_url = %base_url,
            timeout_secs,
            custom_models = models.as_ref().map(Vec::len),
            "router settings loaded"
        );

        Ok(Self {
            gemini: GeminiSettings {
                api_key,
                base_url,
                timeout_secs,
            },
            models,
        })
    }

    /// The configured model list, or the builtin one.
    pub fn registry(&self) -> Result<ModelRegistry> {
        match &self.models {
            Some(models) => ModelRegistry::new(models.clone()),
            None => Ok(ModelRegistry::builtin()),
        }
    }

    /// Per-user settings file, e.g. `~/.config/verse-router/settings.json`
    /// on Linux.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "verse-router")
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }
}

fn parse_timeout(raw: &str) -> ConfigResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: "gemini.timeout_secs".into(),
            message: "must be positive".into(),
        }),
        Ok(secs) => Ok(secs),
        Err(e) => Err(ConfigError::InvalidValue {
            key: "gemini.timeout_secs".into(),
            message: e.to_string(),
        }),
    }
}
