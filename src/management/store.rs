//! Configuration persistence.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::config::FloodgateConfig;
use crate::error::{FloodgateError, Result};

/// Persistence for the service configuration.
///
/// The management surface saves the full configuration after a rule
/// replacement has been applied to the engine.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Persist the given configuration.
    async fn save(&self, config: &FloodgateConfig) -> Result<()>;
}

/// Store that rewrites the YAML configuration file in place.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Create a store persisting to the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn save(&self, config: &FloodgateConfig) -> Result<()> {
        let yaml = serde_yaml::to_string(config)
            .map_err(|e| FloodgateError::Config(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(&self.path, yaml).await?;
        debug!(path = %self.path.display(), "Configuration persisted");
        Ok(())
    }
}
