// File: keeper/src/archive/store.rs
//! Object store seam and its S3 backend

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::ArchiveConfig;
use crate::errors::ArchiveError;

/// Returned when `If-None-Match: *` finds the key already taken
const PRECONDITION_FAILED: u16 = 412;

#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub key: String,
    /// Packaged container on local disk; streamed, never buffered whole
    pub source: PathBuf,
    pub content_length: u64,
    pub content_type: String,
    pub acl: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOutput {
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

/// Durable storage for packaged archives.
///
/// Implementations are shared read-only between tasks. `put_object` never
/// replaces an existing object: a taken key fails with
/// `ArchiveError::AlreadyExists`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput, ArchiveError>;

    /// Keys under `prefix`, in store order
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, ArchiveError>;

    fn object_uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket(), key)
    }
}

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Credentials come from the standard AWS provider chain.
    pub async fn new(config: &ArchiveConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.endpoint_url.is_some() {
            // Custom endpoints are addressed path-style
            builder = builder.force_path_style(true);
        }

        info!(
            "S3 store ready for bucket {} in {}",
            config.bucket, config.region
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }

    fn publish_error(&self, key: &str, reason: String) -> ArchiveError {
        ArchiveError::Publish {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput, ArchiveError> {
        debug!(
            "PUT s3://{}/{} ({} bytes, {})",
            self.bucket, request.key, request.content_length, request.content_type
        );

        let body = ByteStream::from_path(&request.source)
            .await
            .map_err(|e| ArchiveError::io(request.source.display(), e))?;

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .if_none_match("*")
            .acl(ObjectCannedAcl::from(request.acl.as_str()))
            .content_type(&request.content_type)
            .content_length(request.content_length as i64)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let status = e.raw_response().map(|r| r.status().as_u16());
                if status == Some(PRECONDITION_FAILED) {
                    ArchiveError::AlreadyExists {
                        bucket: self.bucket.clone(),
                        key: request.key.clone(),
                    }
                } else {
                    self.publish_error(&request.key, DisplayErrorContext(&e).to_string())
                }
            })?;

        Ok(PutObjectOutput {
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, ArchiveError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| self.publish_error(prefix, DisplayErrorContext(&e).to_string()))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} objects under {}", keys.len(), prefix);
        Ok(keys)
    }
}
