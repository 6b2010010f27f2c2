//! Common test data and helpers

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use keeper::archive::{ArchivePipeline, ObjectStore, PipelineOptions};
use keeper::config::ServerDescriptor;

pub const USER: &str = "alice";
pub const SERVER_NAME: &str = "survival";
pub const BUCKET: &str = "keeper-test-bucket";
pub const PASSWORD: &str = "hunter2";

/// Descriptor pointing at `server_directory` and `store`
pub fn descriptor(
    server_directory: &Path,
    store: Arc<dyn ObjectStore>,
    rcon_port: u16,
) -> ServerDescriptor {
    ServerDescriptor {
        user: USER.to_string(),
        server_name: SERVER_NAME.to_string(),
        cluster: None,
        public_ip: "127.0.0.1".to_string(),
        rcon_port,
        rcon_password: PASSWORD.to_string(),
        bucket: BUCKET.to_string(),
        server_directory: server_directory.to_path_buf(),
        store,
    }
}

/// Pipeline staging into `staging` with a short upload deadline
pub fn pipeline(
    server_directory: &Path,
    staging: &Path,
    store: Arc<dyn ObjectStore>,
) -> ArchivePipeline {
    pipeline_with_timeout(server_directory, staging, store, Duration::from_secs(30))
}

pub fn pipeline_with_timeout(
    server_directory: &Path,
    staging: &Path,
    store: Arc<dyn ObjectStore>,
    upload_timeout: Duration,
) -> ArchivePipeline {
    ArchivePipeline::new(
        Arc::new(descriptor(server_directory, store, 25575)),
        PipelineOptions {
            acl: "private".to_string(),
            staging_directory: staging.to_path_buf(),
            upload_timeout,
        },
    )
}

/// Entry names of a zip container, in archive order
pub fn zip_entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// A loopback port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
