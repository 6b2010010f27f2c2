pub mod archive;
pub mod config;
pub mod constants;
pub mod errors;
pub mod rcon;
pub mod scheduler;
pub mod shutdown;

// Re-export commonly used types
pub use archive::{ArchiveKey, ArchivePipeline, ArchiveReceipt, ObjectStore, S3Store, SnapshotKind};
pub use config::{Config, ConfigManager, ServerDescriptor};
pub use errors::{ArchiveError, ConfigError, KeeperError, RconError};
pub use rcon::{ControlChannel, RetryConnect, RetryPolicy};
pub use scheduler::{SchedulerSettings, SnapshotScheduler};
