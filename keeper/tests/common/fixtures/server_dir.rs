//! Temporary game server directory builder

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway server directory with a minimal world
pub struct TestServerDir {
    temp_dir: TempDir,
}

impl TestServerDir {
    /// Empty directory
    pub fn empty() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// World, config and the top-level server files
    pub fn populated() -> Self {
        Self::empty()
            .with_file("world/level.dat", b"level")
            .with_file("world/region/r.0.0.mca", b"region-0")
            .with_file("world/region/r.0.1.mca", b"region-1")
            .with_file("config/mod.cfg", b"enabled=true\n")
            .with_file("logs/latest.log", b"[Server] Done\n")
            .with_file("server.properties", b"motd=test\n")
            .with_file("whitelist.json", b"[]")
            .with_file("ops.json", b"[]")
    }

    pub fn with_file(self, relative: &str, contents: &[u8]) -> Self {
        let path = self.temp_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, contents).expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }
}
