//! Timer-driven snapshot scheduling for one server
//!
//! Two independent periodic signals wake the scheduler:
//!
//! - **NewUserTick** (fast, ~30s): poll the user count; capture when it changed
//! - **BackupTick** (slow, ~5m): capture unconditionally while anyone is online
//!
//! Every capture is a `WorldSnapshot` followed by a `ServerSnapshot`, run
//! sequentially on the scheduler loop. Nothing is captured while the server
//! is empty.
//!
//! # Consistency
//!
//! When save quiescing is enabled the scheduler sends `save-off` and
//! `save-all` before capturing and always sends `save-on` afterwards, so the
//! world files on disk are not being rewritten mid-package.

pub mod operations;

pub use operations::{SchedulerSettings, SnapshotScheduler, WakeOutcome};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::archive::{ArchivePipeline, ArchiveReceipt, SnapshotKind};
use crate::errors::{ArchiveError, RconError};
use crate::rcon::ControlChannel;

/// Which timer caused the current wake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeReason {
    NewUserTick,
    BackupTick,
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeReason::NewUserTick => f.write_str("user-check"),
            WakeReason::BackupTick => f.write_str("backup"),
        }
    }
}

/// Outcome of one scheduling evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Server is empty; nothing worth preserving changed
    NoUsers,
    /// Fast tick with an unchanged user count
    NoChanges,
    /// Fast tick saw users join or leave
    UsersChanged,
    /// Slow tick with users online
    PeriodicBackup,
}

/// Kinds captured, in order, whenever a capture is triggered
pub const CAPTURE_SEQUENCE: [SnapshotKind; 2] =
    [SnapshotKind::WorldSnapshot, SnapshotKind::ServerSnapshot];

impl Decision {
    pub fn captures(self) -> &'static [SnapshotKind] {
        match self {
            Decision::NoUsers | Decision::NoChanges => &[],
            Decision::UsersChanged | Decision::PeriodicBackup => &CAPTURE_SEQUENCE,
        }
    }
}

/// The transition rule, evaluated once per successful poll.
pub fn decide(reason: WakeReason, current_users: u32, last_user_count: u32) -> Decision {
    if current_users == 0 {
        return Decision::NoUsers;
    }
    match reason {
        WakeReason::NewUserTick if current_users != last_user_count => Decision::UsersChanged,
        WakeReason::NewUserTick => Decision::NoChanges,
        WakeReason::BackupTick => Decision::PeriodicBackup,
    }
}

/// Control-channel operations the scheduler depends on
#[async_trait]
pub trait ServerConsole: Send {
    async fn number_of_users(&mut self) -> Result<u32, RconError>;

    async fn send(&mut self, command: &str) -> Result<String, RconError>;

    /// Drop the current session and make one fresh connect attempt
    async fn reconnect(&mut self) -> Result<(), RconError>;
}

#[async_trait]
impl ServerConsole for ControlChannel {
    async fn number_of_users(&mut self) -> Result<u32, RconError> {
        ControlChannel::number_of_users(self).await
    }

    async fn send(&mut self, command: &str) -> Result<String, RconError> {
        ControlChannel::send(self, command).await
    }

    async fn reconnect(&mut self) -> Result<(), RconError> {
        ControlChannel::reconnect(self).await
    }
}

/// Where triggered captures go
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn capture(&self, kind: SnapshotKind) -> Result<ArchiveReceipt, ArchiveError>;
}

#[async_trait]
impl SnapshotSink for ArchivePipeline {
    async fn capture(&self, kind: SnapshotKind) -> Result<ArchiveReceipt, ArchiveError> {
        ArchivePipeline::capture(self, kind, &[]).await
    }
}
