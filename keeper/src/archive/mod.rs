//! Snapshot capture and publishing
//!
//! Packages part of the server directory into a zip container and uploads it
//! to the object store under a time-stamped, user-attributed key.
//!
//! # Key Layout
//!
//! ```text
//! <user>/archives/<RFC3339 UTC>-<user>-archive[-<kind>]
//! ```
//!
//! The key is the only index: listing a user's prefix and parsing the keys
//! back is enough to order and attribute every archive.
//!
//! # Snapshot Kinds
//!
//! - **ServerSnapshot**: config, logs, mods, world and the top-level JSON and
//!   properties files. No key suffix.
//! - **WorldSnapshot**: the `world` subtree only. Suffix `world`.
//! - **MiscSnapshot**: an explicit, caller-supplied file list. Suffix `misc`.

pub mod packager;
pub mod pipeline;
pub mod store;

pub use pipeline::{ArchivePipeline, PipelineOptions};
pub use store::{ObjectStore, PutObjectOutput, PutObjectRequest, S3Store};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::archive::{ARCHIVES_SEGMENT, ARCHIVE_MARKER};
use crate::errors::ArchiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    ServerSnapshot,
    WorldSnapshot,
    MiscSnapshot,
}

impl SnapshotKind {
    /// Key suffix, `None` for the legacy full-server layout
    pub fn key_suffix(self) -> Option<&'static str> {
        match self {
            SnapshotKind::ServerSnapshot => None,
            SnapshotKind::WorldSnapshot => Some("world"),
            SnapshotKind::MiscSnapshot => Some("misc"),
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            SnapshotKind::ServerSnapshot => "server",
            SnapshotKind::WorldSnapshot => "world",
            SnapshotKind::MiscSnapshot => "misc",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "" => Some(SnapshotKind::ServerSnapshot),
            "-world" => Some(SnapshotKind::WorldSnapshot),
            "-misc" => Some(SnapshotKind::MiscSnapshot),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotKind::ServerSnapshot => "ServerSnapshot",
            SnapshotKind::WorldSnapshot => "WorldSnapshot",
            SnapshotKind::MiscSnapshot => "MiscSnapshot",
        };
        f.write_str(name)
    }
}

impl FromStr for SnapshotKind {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" | "serversnapshot" => Ok(SnapshotKind::ServerSnapshot),
            "world" | "worldsnapshot" => Ok(SnapshotKind::WorldSnapshot),
            "misc" | "miscsnapshot" => Ok(SnapshotKind::MiscSnapshot),
            other => Err(ArchiveError::BadKind {
                kind: other.to_string(),
                reason: "expected one of server, world, misc".to_string(),
            }),
        }
    }
}

/// Parsed form of a stored archive key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveKey {
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SnapshotKind,
}

impl ArchiveKey {
    /// Key for a capture taken at `timestamp`, truncated to whole seconds
    pub fn new(user: &str, timestamp: DateTime<Utc>, kind: SnapshotKind) -> Self {
        Self {
            user: user.to_string(),
            timestamp: timestamp.trunc_subsecs(0),
            kind,
        }
    }

    /// `<user>/archives/`
    pub fn user_prefix(user: &str) -> String {
        format!("{}/{}/", user, ARCHIVES_SEGMENT)
    }

    /// Final path segment of the key
    pub fn file_name(&self) -> String {
        let mut name = format!(
            "{}-{}-{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.user,
            ARCHIVE_MARKER
        );
        if let Some(suffix) = self.kind.key_suffix() {
            name.push('-');
            name.push_str(suffix);
        }
        name
    }

    pub fn to_key(&self) -> String {
        format!("{}{}", Self::user_prefix(&self.user), self.file_name())
    }

    pub fn parse(key: &str) -> Result<Self, ArchiveError> {
        let invalid = |reason: &str| ArchiveError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let separator = format!("/{}/", ARCHIVES_SEGMENT);
        let (user, name) = key
            .split_once(&separator)
            .ok_or_else(|| invalid("missing archives segment"))?;
        if user.is_empty() || user.contains('/') {
            return Err(invalid("bad user prefix"));
        }

        let marker = format!("-{}-{}", user, ARCHIVE_MARKER);
        let marker_at = name
            .rfind(&marker)
            .ok_or_else(|| invalid("missing user archive marker"))?;

        let timestamp = DateTime::parse_from_rfc3339(&name[..marker_at])
            .map_err(|e| invalid(&format!("timestamp: {}", e)))?
            .with_timezone(&Utc);

        let kind = SnapshotKind::from_suffix(&name[marker_at + marker.len()..])
            .ok_or_else(|| invalid("unknown kind suffix"))?;

        Ok(Self {
            user: user.to_string(),
            timestamp,
            kind,
        })
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}

/// Proof of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    pub archive_filename: String,
    pub bucket: String,
    pub stored_key: String,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub user: String,
    pub uri: String,
    pub kind: SnapshotKind,
    pub size_bytes: u64,
}
