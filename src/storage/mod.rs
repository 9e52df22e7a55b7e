/// Blob storage for uploaded import files.
///
/// An upload is written under a freshly generated token directory plus the
/// original base filename, and the backend returns a reference the worker
/// can fetch straight away:
/// - S3: a presigned GET URL
/// - Local disk: a path under the public uploads prefix
///
/// The backend is chosen once at startup from configuration.
pub mod local;
pub mod s3;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{ImportError, Result};

pub use local::LocalBackend;
pub use s3::S3Backend;

/// Length of the hex token directory.
const TOKEN_LEN: usize = 20;

/// Metadata returned after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Backend key, `<token>/<filename>`.
    pub storage_key: String,
    /// URL or path handed to the import job.
    pub reference: String,
    /// Size in bytes of the uploaded data.
    pub size: u64,
}

/// Trait for pluggable upload backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human-readable name of this backend (e.g., "S3", "local").
    fn name(&self) -> &str;

    /// Store `data` under `key`. The returned reference must be readable as
    /// soon as this resolves.
    async fn put(&self, key: &str, data: &[u8]) -> Result<UploadResult>;
}

/// Store an uploaded file under a new random directory.
pub async fn store(backend: &dyn StorageBackend, filename: &str, data: &[u8]) -> Result<UploadResult> {
    let key = format!("{}/{}", random_token(), base_filename(filename)?);
    let result = backend.put(&key, data).await?;
    tracing::info!(backend = backend.name(), key = %result.storage_key, size = result.size, "Upload stored");
    Ok(result)
}

/// Namespacing token: hash of the current time and a v4 UUID.
pub fn random_token() -> String {
    let seed = format!("{}--{}", Utc::now().to_rfc3339(), Uuid::new_v4());
    let digest = hex::encode(Sha256::digest(seed.as_bytes()));
    digest[..TOKEN_LEN].to_string()
}

/// Last path component of a client-supplied filename.
pub fn base_filename(filename: &str) -> Result<String> {
    let normalized = filename.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| ImportError::InvalidRequest(format!("invalid upload filename: {filename:?}")))
}

/// Pick the backend: S3 when credentials are configured, local disk otherwise.
pub fn from_config(config: &StorageConfig) -> Arc<dyn StorageBackend> {
    match config.s3.as_ref().filter(|s3| s3.has_credentials()) {
        Some(s3) => Arc::new(S3Backend::new(s3)),
        None => Arc::new(LocalBackend::new(&config.local_root, &config.public_prefix)),
    }
}
