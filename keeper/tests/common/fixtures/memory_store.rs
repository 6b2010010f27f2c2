//! In-memory object store for testing

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use keeper::archive::{ObjectStore, PutObjectOutput, PutObjectRequest};
use keeper::errors::ArchiveError;

/// One recorded upload
#[derive(Debug, Clone)]
pub struct StoredPut {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub content_length: u64,
    pub acl: String,
}

/// Object store backed by a map; keys are listed in lexical order like S3.
/// Like a conditional S3 PUT, an existing key is never overwritten.
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, StoredPut>>,
    puts: Mutex<Vec<String>>,
    attempts: AtomicU64,
    versions: AtomicU64,
    fail_puts: AtomicBool,
    hang_puts: AtomicBool,
    every_key_taken: AtomicBool,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            puts: Mutex::new(Vec::new()),
            attempts: AtomicU64::new(0),
            versions: AtomicU64::new(0),
            fail_puts: AtomicBool::new(false),
            hang_puts: AtomicBool::new(false),
            every_key_taken: AtomicBool::new(false),
        }
    }

    /// Make every subsequent upload fail
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent upload wait forever
    pub fn hang_puts(&self, hang: bool) {
        self.hang_puts.store(hang, Ordering::SeqCst);
    }

    /// Answer every subsequent upload as if its key already existed
    pub fn every_key_taken(&self, taken: bool) {
        self.every_key_taken.store(taken, Ordering::SeqCst);
    }

    /// Seed an object without going through `put_object`
    pub fn insert(&self, key: &str, body: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredPut {
                key: key.to_string(),
                body: body.to_vec(),
                content_type: "application/octet-stream".to_string(),
                content_length: body.len() as u64,
                acl: "private".to_string(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredPut> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Keys stored through `put_object`, in upload order
    pub fn put_keys(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    /// Calls to `put_object`, including rejected ones
    pub fn put_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput, ArchiveError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.hang_puts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ArchiveError::Publish {
                bucket: self.bucket.clone(),
                key: request.key,
                reason: "injected failure".to_string(),
            });
        }

        let body = tokio::fs::read(&request.source)
            .await
            .map_err(|e| ArchiveError::Io {
                path: request.source.display().to_string(),
                reason: e.to_string(),
            })?;
        assert_eq!(body.len() as u64, request.content_length);

        let mut objects = self.objects.lock().unwrap();
        if self.every_key_taken.load(Ordering::SeqCst) || objects.contains_key(&request.key) {
            return Err(ArchiveError::AlreadyExists {
                bucket: self.bucket.clone(),
                key: request.key,
            });
        }

        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        self.puts.lock().unwrap().push(request.key.clone());
        objects.insert(
            request.key.clone(),
            StoredPut {
                key: request.key,
                body,
                content_type: request.content_type,
                content_length: request.content_length,
                acl: request.acl,
            },
        );

        Ok(PutObjectOutput {
            etag: Some(format!("\"etag-{}\"", version)),
            version_id: Some(format!("v{}", version)),
        })
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, ArchiveError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
