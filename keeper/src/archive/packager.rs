//! Zip packaging of server directory entries
//!
//! Entries are named relative to the server directory. Directory entries end
//! in `/`; files are deflate-compressed. All names are sanitized so an
//! archive can never reference a path outside its root. Overlapping entries
//! are written once.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::ArchiveError;

/// One top-level path to add, recursively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    /// Missing optional entries are skipped instead of failing the package
    pub required: bool,
}

impl PackageEntry {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Normalize an entry name: forward slashes only, no empty, `.` or `..`
/// segments, no leading `/`.
pub fn sanitized_name(name: &str) -> String {
    name.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// Write `entries` under `root` into a new zip at `destination`.
pub fn package_to_file(
    root: &Path,
    entries: &[PackageEntry],
    destination: &Path,
) -> Result<PackageSummary, ArchiveError> {
    let file = File::create(destination).map_err(|e| ArchiveError::io(destination.display(), e))?;
    let (_, summary) = package(root, entries, file)?;
    Ok(summary)
}

/// Write `entries` under `root` into `writer`, returning it once the
/// central directory has been written.
pub fn package<W: Write + Seek>(
    root: &Path,
    entries: &[PackageEntry],
    writer: W,
) -> Result<(W, PackageSummary), ArchiveError> {
    let root_meta = std::fs::metadata(root).map_err(|e| ArchiveError::io(root.display(), e))?;
    if !root_meta.is_dir() {
        return Err(ArchiveError::io(root.display(), "not a directory"));
    }

    let mut archive = ZipWriter::new(writer);
    let mut summary = PackageSummary::default();
    let mut written: HashSet<String> = HashSet::new();

    for entry in entries {
        let relative = sanitized_name(&entry.name);
        if relative.is_empty() {
            continue;
        }
        let top = root.join(&relative);
        if !top.exists() {
            if entry.required {
                return Err(ArchiveError::io(top.display(), "no such file or directory"));
            }
            debug!("Skipping missing optional entry {}", relative);
            continue;
        }

        for walked in WalkDir::new(&top).sort_by_file_name() {
            let walked = walked.map_err(|e| ArchiveError::io(top.display(), e))?;
            let path = walked.path();
            let name = entry_name(root, path)?;
            let file_type = walked.file_type();

            if file_type.is_dir() {
                let name = format!("{}/", name);
                if !written.insert(name.clone()) {
                    continue;
                }
                debug!("Adding directory {}", name);
                archive
                    .add_directory(name, SimpleFileOptions::default())
                    .map_err(|e| ArchiveError::io(path.display(), e))?;
                summary.directories += 1;
            } else if file_type.is_file() {
                if !written.insert(name.clone()) {
                    debug!("Already packaged {}", name);
                    continue;
                }
                debug!("Adding file {}", name);
                archive
                    .start_file(name, file_options())
                    .map_err(|e| ArchiveError::io(path.display(), e))?;
                let mut source = File::open(path).map_err(|e| ArchiveError::io(path.display(), e))?;
                summary.bytes +=
                    io::copy(&mut source, &mut archive).map_err(|e| ArchiveError::io(path.display(), e))?;
                summary.files += 1;
            } else {
                debug!("Skipping non-regular file {}", path.display());
            }
        }
    }

    let writer = archive
        .finish()
        .map_err(|e| ArchiveError::io(root.display(), e))?;
    Ok((writer, summary))
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn entry_name(root: &Path, path: &Path) -> Result<String, ArchiveError> {
    let relative: PathBuf = path
        .strip_prefix(root)
        .map_err(|e| ArchiveError::io(path.display(), e))?
        .to_path_buf();
    Ok(sanitized_name(&relative.to_string_lossy()))
}
