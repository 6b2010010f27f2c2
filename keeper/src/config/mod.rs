// File: keeper/src/config/mod.rs
pub mod manager;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::archive::ObjectStore;
use crate::constants;
use crate::errors::ConfigError;
use crate::rcon::RetryPolicy;

pub use manager::ConfigManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub user: String,
    pub name: String,
    pub cluster: Option<String>,
    pub public_ip: String,
    pub rcon_port: u16,
    pub rcon_password: String,
    pub server_directory: PathBuf,
}

// Keeps the RCON password out of `{:?}` output
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("user", &self.user)
            .field("name", &self.name)
            .field("cluster", &self.cluster)
            .field("public_ip", &self.public_ip)
            .field("rcon_port", &self.rcon_port)
            .field("rcon_password", &"***")
            .field("server_directory", &self.server_directory)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    #[serde(default = "default_acl")]
    pub acl: String,
    pub staging_directory: Option<PathBuf>,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_user_check_interval")]
    pub user_check_interval_seconds: u64,
    #[serde(default = "default_backup_interval")]
    pub backup_interval_seconds: u64,
    /// Absent means keep trying until the server answers
    pub rcon_max_retries: Option<u32>,
    #[serde(default = "default_retry_delay")]
    pub rcon_retry_delay_seconds: u64,
    #[serde(default = "default_rcon_timeout")]
    pub rcon_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub quiesce_saves: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            user_check_interval_seconds: default_user_check_interval(),
            backup_interval_seconds: default_backup_interval(),
            rcon_max_retries: None,
            rcon_retry_delay_seconds: default_retry_delay(),
            rcon_timeout_seconds: default_rcon_timeout(),
            quiesce_saves: true,
        }
    }
}

fn default_acl() -> String {
    constants::archive::DEFAULT_ACL.to_string()
}

fn default_upload_timeout() -> u64 {
    constants::archive::DEFAULT_UPLOAD_TIMEOUT_SECONDS
}

fn default_user_check_interval() -> u64 {
    constants::scheduler::USER_CHECK_INTERVAL_SECONDS
}

fn default_backup_interval() -> u64 {
    constants::scheduler::BACKUP_INTERVAL_SECONDS
}

fn default_retry_delay() -> u64 {
    constants::scheduler::RCON_RETRY_DELAY_SECONDS
}

fn default_rcon_timeout() -> u64 {
    constants::rcon::DEFAULT_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Field-level checks that need no filesystem access
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("server.user", &self.server.user)?;
        require_non_empty("server.name", &self.server.name)?;
        require_non_empty("server.public_ip", &self.server.public_ip)?;
        require_non_empty("archive.bucket", &self.archive.bucket)?;
        require_non_empty("archive.region", &self.archive.region)?;

        if self.server.rcon_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.rcon_port".to_string(),
                reason: "port must be non-zero".to_string(),
            });
        }

        for (field, value) in [
            (
                "scheduler.user_check_interval_seconds",
                self.scheduler.user_check_interval_seconds,
            ),
            (
                "scheduler.backup_interval_seconds",
                self.scheduler.backup_interval_seconds,
            ),
            (
                "scheduler.rcon_timeout_seconds",
                self.scheduler.rcon_timeout_seconds,
            ),
            (
                "archive.upload_timeout_seconds",
                self.archive.upload_timeout_seconds,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.scheduler.rcon_max_retries {
            Some(retries) => RetryPolicy::Bounded(retries),
            None => RetryPolicy::Unbounded,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.scheduler.rcon_retry_delay_seconds)
    }

    pub fn rcon_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.rcon_timeout_seconds)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.archive.upload_timeout_seconds)
    }

    pub fn staging_directory(&self) -> PathBuf {
        self.archive
            .staging_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Build the immutable descriptor the core components borrow
    pub fn server_descriptor(&self, store: Arc<dyn ObjectStore>) -> ServerDescriptor {
        ServerDescriptor {
            user: self.server.user.clone(),
            server_name: self.server.name.clone(),
            cluster: self.server.cluster.clone(),
            public_ip: self.server.public_ip.clone(),
            rcon_port: self.server.rcon_port,
            rcon_password: self.server.rcon_password.clone(),
            bucket: self.archive.bucket.clone(),
            server_directory: self.server.server_directory.clone(),
            store,
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Everything the core needs to know about the one server it protects.
///
/// Built once per invocation and never mutated; the object store handle is
/// shared read-only.
#[derive(Clone)]
pub struct ServerDescriptor {
    pub user: String,
    pub server_name: String,
    pub cluster: Option<String>,
    pub public_ip: String,
    pub rcon_port: u16,
    pub rcon_password: String,
    pub bucket: String,
    pub server_directory: PathBuf,
    pub store: Arc<dyn ObjectStore>,
}

impl ServerDescriptor {
    pub fn rcon_address(&self) -> String {
        format!("{}:{}", self.public_ip, self.rcon_port)
    }
}

impl fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("user", &self.user)
            .field("server_name", &self.server_name)
            .field("cluster", &self.cluster)
            .field("public_ip", &self.public_ip)
            .field("rcon_port", &self.rcon_port)
            .field("bucket", &self.bucket)
            .field("server_directory", &self.server_directory)
            .finish_non_exhaustive()
    }
}
