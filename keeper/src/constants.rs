//! Central repository for timeouts, cadences and layout strings
//!
//! Organized by category so the defaults used by the config loader and the
//! values baked into the wire and storage formats live in one place.

use std::time::Duration;

/// Control channel constants
pub mod rcon {
    use super::Duration;

    /// Status query whose reply carries the connected-user count
    pub const LIST_COMMAND: &str = "list";

    pub const SAVE_ON_COMMAND: &str = "save-on";
    pub const SAVE_OFF_COMMAND: &str = "save-off";
    pub const SAVE_ALL_COMMAND: &str = "save-all";

    /// Pattern for `There are <N>/<M> players online...`
    pub const USERS_PATTERN: &str = r"There are (\d+)/\d+";

    /// Default deadline for a single request/response exchange
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Largest body a server may send in a single packet
    pub const MAX_PAYLOAD_BYTES: usize = 4096;

    /// Attempts per batch when retrying without bound
    pub const UNBOUNDED_BATCH_SIZE: u32 = 10;
}

/// Scheduler cadence defaults
pub mod scheduler {
    /// Fast tick: poll for user-count changes
    pub const USER_CHECK_INTERVAL_SECONDS: u64 = 30;

    /// Slow tick: unconditional full backup while users are online
    pub const BACKUP_INTERVAL_SECONDS: u64 = 300;

    pub const RCON_RETRY_DELAY_SECONDS: u64 = 5;
}

/// Archive layout and upload constants
pub mod archive {
    /// Directory segment between the user prefix and the archive name
    pub const ARCHIVES_SEGMENT: &str = "archives";

    /// Trailing marker of every archive name
    pub const ARCHIVE_MARKER: &str = "archive";

    pub const DEFAULT_ACL: &str = "private";

    pub const DEFAULT_UPLOAD_TIMEOUT_SECONDS: u64 = 300;

    /// Keys tried before a publish gives up on a same-second collision
    pub const PUBLISH_KEY_ATTEMPTS: u32 = 3;

    /// Top-level entries of a full server snapshot
    pub const SERVER_ENTRIES: &[&str] = &[
        "config",
        "logs",
        "mods",
        "world",
        "banned-ips.json",
        "banned-players.json",
        "server.properties",
        "usercache.json",
        "whitelist.json",
    ];

    /// Subtree captured by a world snapshot
    pub const WORLD_ENTRY: &str = "world";
}
