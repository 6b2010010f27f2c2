// File: keeper/src/config/manager.rs
use super::Config;
use crate::errors::ConfigError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    config_path: PathBuf,
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_path.into();
        let config = Self::load_configuration(&config_path).await?;
        Ok(Self {
            config_path,
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn load_configuration(config_path: &Path) -> Result<Config, ConfigError> {
        debug!("Loading configuration from {}", config_path.display());

        let content = fs::read_to_string(config_path)
            .await
            .map_err(|e| ConfigError::LoadFailed {
                path: config_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let config = Config::from_toml_str(&content)?;

        let server_dir = &config.server.server_directory;
        let metadata = fs::metadata(server_dir)
            .await
            .map_err(|e| ConfigError::InvalidValue {
                field: "server.server_directory".to_string(),
                reason: format!("{}: {}", server_dir.display(), e),
            })?;
        if !metadata.is_dir() {
            return Err(ConfigError::InvalidValue {
                field: "server.server_directory".to_string(),
                reason: format!("{} is not a directory", server_dir.display()),
            });
        }

        info!(
            "Loaded config for server {} (user {}, bucket {})",
            config.server.name, config.server.user, config.archive.bucket
        );

        Ok(config)
    }
}
