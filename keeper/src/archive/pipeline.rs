// File: keeper/src/archive/pipeline.rs
use chrono::Utc;
use glob::glob;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, info_span, instrument, Span};
use uuid::Uuid;

use super::packager::{self, sanitized_name, PackageEntry};
use super::store::{PutObjectOutput, PutObjectRequest};
use super::{ArchiveKey, ArchiveReceipt, SnapshotKind};
use crate::config::ServerDescriptor;
use crate::constants::archive::{PUBLISH_KEY_ATTEMPTS, SERVER_ENTRIES, WORLD_ENTRY};
use crate::errors::ArchiveError;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub acl: String,
    pub staging_directory: PathBuf,
    pub upload_timeout: Duration,
}

/// Capture -> package -> publish for one server
pub struct ArchivePipeline {
    descriptor: Arc<ServerDescriptor>,
    options: PipelineOptions,
    span: Span,
}

impl ArchivePipeline {
    pub fn new(descriptor: Arc<ServerDescriptor>, options: PipelineOptions) -> Self {
        let span = info_span!(
            "archive",
            user = %descriptor.user,
            server = %descriptor.server_name,
            bucket = %descriptor.bucket,
        );
        Self {
            descriptor,
            options,
            span,
        }
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Package the entries selected by `kind` and publish them.
    ///
    /// `files` must be empty unless `kind` is `MiscSnapshot`, and non-empty
    /// when it is.
    #[instrument(parent = &self.span, skip(self, kind, files), fields(kind = %kind))]
    pub async fn capture(
        &self,
        kind: SnapshotKind,
        files: &[String],
    ) -> Result<ArchiveReceipt, ArchiveError> {
        validate_request(kind, files)?;
        let entries = self.entries_for(kind, files)?;

        let staged = tempfile::Builder::new()
            .prefix(&format!(
                "{}-{}-{}-",
                self.descriptor.server_name,
                kind.short_name(),
                Uuid::new_v4().simple()
            ))
            .suffix(".zip")
            .tempfile_in(&self.options.staging_directory)
            .map_err(|e| ArchiveError::io(self.options.staging_directory.display(), e))?;

        let root = self.descriptor.server_directory.clone();
        let destination = staged.path().to_path_buf();
        debug!(
            "Packaging {} entries from {} into {}",
            entries.len(),
            root.display(),
            destination.display()
        );

        let summary = tokio::task::spawn_blocking(move || {
            packager::package_to_file(&root, &entries, &destination)
        })
        .await
        .map_err(|e| ArchiveError::io(staged.path().display(), e))??;

        info!(
            files = summary.files,
            directories = summary.directories,
            bytes = summary.bytes,
            "Packaged {}",
            kind
        );

        // Staged container is removed when `staged` drops
        self.publish_path(staged.path(), kind).await
    }

    /// Upload an already-packaged container under a fresh key.
    #[instrument(parent = &self.span, skip(self, kind), fields(kind = %kind))]
    pub async fn publish_file(
        &self,
        path: &Path,
        kind: SnapshotKind,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        self.publish_path(path, kind).await
    }

    /// Stream `path` to the store. A key taken by an earlier archive in the
    /// same second is retried with the next second's timestamp.
    async fn publish_path(
        &self,
        path: &Path,
        kind: SnapshotKind,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        let size_bytes = tokio::fs::metadata(path)
            .await
            .map_err(|e| ArchiveError::io(path.display(), e))?
            .len();
        let content_type = sniff_content_type(path).await?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            let archive_key = ArchiveKey::new(&self.descriptor.user, Utc::now(), kind);
            let request = PutObjectRequest {
                key: archive_key.to_key(),
                source: path.to_path_buf(),
                content_length: size_bytes,
                content_type: content_type.to_string(),
                acl: self.options.acl.clone(),
            };

            match self.upload(request).await {
                Ok(output) => {
                    return Ok(self.receipt(archive_key, output, kind, size_bytes));
                }
                Err(ArchiveError::AlreadyExists { key, .. }) if attempts < PUBLISH_KEY_ATTEMPTS => {
                    debug!("{} is taken, waiting for the next second", key);
                    tokio::time::sleep(until_next_second()).await;
                }
                Err(ArchiveError::AlreadyExists { bucket, key }) => {
                    return Err(ArchiveError::Publish {
                        bucket,
                        key,
                        reason: format!("key still taken after {} attempts", attempts),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn upload(&self, request: PutObjectRequest) -> Result<PutObjectOutput, ArchiveError> {
        let store = &self.descriptor.store;
        let key = request.key.clone();
        debug!(
            "Publishing {} bytes ({}) to {}:{}",
            request.content_length,
            request.content_type,
            store.bucket(),
            key
        );

        match tokio::time::timeout(self.options.upload_timeout, store.put_object(request)).await {
            Ok(result) => result,
            Err(_) => {
                error!("Upload of {} timed out", key);
                Err(ArchiveError::Timeout {
                    key,
                    seconds: self.options.upload_timeout.as_secs(),
                })
            }
        }
    }

    fn receipt(
        &self,
        archive_key: ArchiveKey,
        output: PutObjectOutput,
        kind: SnapshotKind,
        size_bytes: u64,
    ) -> ArchiveReceipt {
        let store = &self.descriptor.store;
        let key = archive_key.to_key();
        let receipt = ArchiveReceipt {
            archive_filename: archive_key.file_name(),
            bucket: store.bucket().to_string(),
            uri: store.object_uri(&key),
            stored_key: key,
            etag: output.etag,
            version_id: output.version_id,
            user: self.descriptor.user.clone(),
            kind,
            size_bytes,
        };

        info!(
            key = %receipt.stored_key,
            etag = receipt.etag.as_deref().unwrap_or("----"),
            version = receipt.version_id.as_deref().unwrap_or("----"),
            "Published archive"
        );
        receipt
    }

    /// Archives stored for `user`, oldest first. Keys that do not follow
    /// the archive layout are ignored.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn list_archives(
        &self,
        user: &str,
        kind: Option<SnapshotKind>,
    ) -> Result<Vec<ArchiveKey>, ArchiveError> {
        let keys = self
            .descriptor
            .store
            .list_objects(&ArchiveKey::user_prefix(user))
            .await?;

        let mut archives: Vec<ArchiveKey> = keys
            .iter()
            .filter_map(|key| match ArchiveKey::parse(key) {
                Ok(key) => Some(key),
                Err(e) => {
                    debug!("Ignoring object: {}", e);
                    None
                }
            })
            .filter(|key| key.user == user)
            .filter(|key| kind.map_or(true, |k| key.kind == k))
            .collect();

        archives.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(archives)
    }

    fn entries_for(
        &self,
        kind: SnapshotKind,
        files: &[String],
    ) -> Result<Vec<PackageEntry>, ArchiveError> {
        match kind {
            SnapshotKind::ServerSnapshot => Ok(SERVER_ENTRIES
                .iter()
                .map(|name| PackageEntry::optional(*name))
                .collect()),
            SnapshotKind::WorldSnapshot => Ok(vec![PackageEntry::required(WORLD_ENTRY)]),
            SnapshotKind::MiscSnapshot => {
                let mut entries = Vec::new();
                for file in files {
                    entries.extend(expand_misc_entry(&self.descriptor.server_directory, file)?);
                }
                Ok(entries)
            }
        }
    }
}

/// Reject file lists that do not match the snapshot kind.
pub fn validate_request(kind: SnapshotKind, files: &[String]) -> Result<(), ArchiveError> {
    match kind {
        SnapshotKind::MiscSnapshot if files.is_empty() => Err(ArchiveError::BadKind {
            kind: kind.to_string(),
            reason: "need at least one file".to_string(),
        }),
        SnapshotKind::ServerSnapshot | SnapshotKind::WorldSnapshot if !files.is_empty() => {
            Err(ArchiveError::BadKind {
                kind: kind.to_string(),
                reason: "cannot specify files".to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn is_glob(name: &str) -> bool {
    name.contains(['*', '?', '['])
}

/// Resolve one misc entry, expanding glob patterns relative to `root`.
fn expand_misc_entry(root: &Path, file: &str) -> Result<Vec<PackageEntry>, ArchiveError> {
    let relative = sanitized_name(file);
    if relative.is_empty() {
        return Err(ArchiveError::BadKind {
            kind: SnapshotKind::MiscSnapshot.to_string(),
            reason: format!("\"{}\" does not name anything under the server directory", file),
        });
    }
    if !is_glob(&relative) {
        return Ok(vec![PackageEntry::required(relative)]);
    }

    let pattern = root.join(&relative);
    let pattern = pattern.to_string_lossy();
    let paths = glob(&pattern).map_err(|e| ArchiveError::io(&pattern, e))?;

    let mut entries = Vec::new();
    for path in paths {
        let path = path.map_err(|e| ArchiveError::io(&pattern, e))?;
        if let Ok(rel) = path.strip_prefix(root) {
            entries.push(PackageEntry::required(rel.to_string_lossy()));
        }
    }

    if entries.is_empty() {
        return Err(ArchiveError::io(&pattern, "pattern matched no files"));
    }
    Ok(entries)
}

/// Time left until the wall clock reaches the next whole second
fn until_next_second() -> Duration {
    let millis = u64::from(Utc::now().timestamp_subsec_millis());
    Duration::from_millis(1000u64.saturating_sub(millis).max(1))
}

async fn sniff_content_type(path: &Path) -> Result<&'static str, ArchiveError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ArchiveError::io(path.display(), e))?;
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        let read = file
            .read(&mut head[filled..])
            .await
            .map_err(|e| ArchiveError::io(path.display(), e))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(detect_content_type(&head[..filled]))
}

/// Sniff the container type from its leading bytes.
pub fn detect_content_type(body: &[u8]) -> &'static str {
    const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
    const EMPTY_ZIP_MAGIC: &[u8] = b"PK\x05\x06";
    const GZIP_MAGIC: &[u8] = b"\x1f\x8b\x08";

    if body.starts_with(ZIP_MAGIC) || body.starts_with(EMPTY_ZIP_MAGIC) {
        "application/zip"
    } else if body.starts_with(GZIP_MAGIC) {
        "application/x-gzip"
    } else {
        "application/octet-stream"
    }
}
