//! Layered configuration for the router.
//!
//! ```rust,no_run
//! use verse_router::{ConfigBuilder, ModelRouter, RouterSettings};
//!
//! # async fn example() -> Result<(), verse_router::Error> {
//! let config = ConfigBuilder::new()
//!     .env()
//!     .file(RouterSettings::default_path().unwrap_or_else(|| "verse.json".into()))
//!     .build();
//! let settings = RouterSettings::load(&config).await?;
//! let router = ModelRouter::builder().settings(settings).build()?;
//! # Ok(())
//! # }
//! ```

mod composite;
mod env;
mod file;
mod memory;
mod provider;
mod settings;

pub use composite::CompositeConfigProvider;
pub use env::{DEFAULT_ENV_PREFIX, EnvConfigProvider};
pub use file::FileConfigProvider;
pub use memory::MemoryConfigProvider;
pub use provider::{ConfigProvider, ConfigProviderExt};
pub use settings::{GeminiSettings, RouterSettings};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Provider cannot perform the operation (e.g. writing to env).
    #[error("Provider error: {message}")]
    Provider { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Collects providers in priority order; the first one added wins.
#[derive(Default)]
pub struct ConfigBuilder {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `VERSE_`-prefixed environment variables.
    pub fn env(self) -> Self {
        self.provider(EnvConfigProvider::new())
    }

    pub fn env_with_prefix(self, prefix: &str) -> Self {
        self.provider(EnvConfigProvider::prefixed(prefix))
    }

    pub fn file(self, path: impl Into<PathBuf>) -> Self {
        self.provider(FileConfigProvider::new(path))
    }

    pub fn memory(self, provider: MemoryConfigProvider) -> Self {
        self.provider(provider)
    }

    pub fn provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn build(self) -> CompositeConfigProvider {
        self.providers
            .into_iter()
            .fold(CompositeConfigProvider::new(), |composite, provider| {
                composite.boxed(provider)
            })
    }
}
