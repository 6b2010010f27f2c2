//! Custom error types for the backup keeper
//!
//! Provides structured error handling with context for the control channel,
//! the archive pipeline and configuration loading.

use std::fmt;

/// Main error type for the backup keeper
#[derive(Debug)]
pub enum KeeperError {
    /// Configuration-related errors
    Config(ConfigError),

    /// Control channel (RCON) errors
    Rcon(RconError),

    /// Archive packaging and publishing errors
    Archive(ArchiveError),

    /// Other errors with context
    Other(String),
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Missing required configuration
    MissingRequired { field: String },

    /// Configuration parsing error
    ParseError { reason: String },
}

/// Control channel error variants
#[derive(Debug)]
pub enum RconError {
    /// TCP connect failed
    ConnectFailed { address: String, reason: String },

    /// Server rejected the credential during the login handshake
    AuthFailed { address: String },

    /// Send attempted on a channel without a live connection
    NotConnected,

    /// Read or write on an established connection failed
    TransportFailed { command: String, reason: String },

    /// No reply arrived before the deadline
    Timeout { command: String, seconds: u64 },

    /// Reply did not have the expected shape
    ParseFailed { reply: String, reason: String },

    /// Every connect attempt allowed by the retry policy failed
    RetryExhausted {
        address: String,
        attempts: u64,
        last_error: String,
    },
}

/// Archive pipeline error variants
#[derive(Debug)]
pub enum ArchiveError {
    /// Snapshot kind and file list do not agree
    BadKind { kind: String, reason: String },

    /// Filesystem failure while packaging
    Io { path: String, reason: String },

    /// Object store rejected or failed the upload
    Publish {
        bucket: String,
        key: String,
        reason: String,
    },

    /// Store already holds an object under this key
    AlreadyExists { bucket: String, key: String },

    /// Upload did not finish before the deadline
    Timeout { key: String, seconds: u64 },

    /// Store key does not follow the archive layout
    InvalidKey { key: String, reason: String },
}

impl RconError {
    /// Connection-level failures that a fresh connect may cure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RconError::ConnectFailed { .. }
                | RconError::NotConnected
                | RconError::TransportFailed { .. }
                | RconError::Timeout { .. }
        )
    }
}

impl ArchiveError {
    pub(crate) fn io(path: impl fmt::Display, err: impl fmt::Display) -> Self {
        ArchiveError::Io {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }
}

// Implement Display for all error types
impl fmt::Display for KeeperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeeperError::Config(e) => write!(f, "Configuration error: {}", e),
            KeeperError::Rcon(e) => write!(f, "RCON error: {}", e),
            KeeperError::Archive(e) => write!(f, "Archive error: {}", e),
            KeeperError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::MissingRequired { field } => {
                write!(f, "Missing required field: {}", field)
            }
            ConfigError::ParseError { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
        }
    }
}

impl fmt::Display for RconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RconError::ConnectFailed { address, reason } => {
                write!(f, "Connection to {} failed: {}", address, reason)
            }
            RconError::AuthFailed { address } => {
                write!(f, "Authentication rejected by {}", address)
            }
            RconError::NotConnected => write!(f, "No connection to the server"),
            RconError::TransportFailed { command, reason } => {
                write!(f, "Failed to send \"{}\" to server: {}", command, reason)
            }
            RconError::Timeout { command, seconds } => {
                write!(f, "No reply to \"{}\" within {}s", command, seconds)
            }
            RconError::ParseFailed { reply, reason } => {
                write!(f, "Could not parse reply \"{}\": {}", reply, reason)
            }
            RconError::RetryExhausted {
                address,
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "Gave up connecting to {} after {} attempts: {}",
                    address, attempts, last_error
                )
            }
        }
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::BadKind { kind, reason } => {
                write!(f, "Invalid {} request: {}", kind, reason)
            }
            ArchiveError::Io { path, reason } => {
                write!(f, "I/O failure on '{}': {}", path, reason)
            }
            ArchiveError::Publish {
                bucket,
                key,
                reason,
            } => {
                write!(f, "Failed to publish {}:{}: {}", bucket, key, reason)
            }
            ArchiveError::AlreadyExists { bucket, key } => {
                write!(f, "Object {}:{} already exists", bucket, key)
            }
            ArchiveError::Timeout { key, seconds } => {
                write!(f, "Upload of {} did not finish within {}s", key, seconds)
            }
            ArchiveError::InvalidKey { key, reason } => {
                write!(f, "Invalid archive key '{}': {}", key, reason)
            }
        }
    }
}

// Implement std::error::Error
impl std::error::Error for KeeperError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for RconError {}
impl std::error::Error for ArchiveError {}

impl From<anyhow::Error> for KeeperError {
    fn from(err: anyhow::Error) -> Self {
        KeeperError::Other(err.to_string())
    }
}

impl From<ConfigError> for KeeperError {
    fn from(err: ConfigError) -> Self {
        KeeperError::Config(err)
    }
}

impl From<RconError> for KeeperError {
    fn from(err: RconError) -> Self {
        KeeperError::Rcon(err)
    }
}

impl From<ArchiveError> for KeeperError {
    fn from(err: ArchiveError) -> Self {
        KeeperError::Archive(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_retryable() {
        assert!(RconError::NotConnected.is_retryable());
        assert!(RconError::Timeout {
            command: "list".into(),
            seconds: 10
        }
        .is_retryable());
        assert!(!RconError::ParseFailed {
            reply: "malformed".into(),
            reason: "no match".into()
        }
        .is_retryable());
        assert!(!RconError::AuthFailed {
            address: "127.0.0.1:25575".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_keeper_error_wraps_context() {
        let err: KeeperError = ArchiveError::BadKind {
            kind: "MiscSnapshot".into(),
            reason: "no files".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Archive error: Invalid MiscSnapshot request: no files"
        );
    }
}
