/// Local disk upload backend.
///
/// Writes under `root/<token>/<filename>` and returns the path relative to
/// the public prefix (e.g. `/uploads/<token>/<filename>`), which the web
/// server maps back onto `root`.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{StorageBackend, UploadResult};
use crate::error::Result;

pub struct LocalBackend {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBackend {
    pub fn new(root: impl AsRef<Path>, public_prefix: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<UploadResult> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        Ok(UploadResult {
            storage_key: key.to_string(),
            reference: format!("{}/{}", self.public_prefix, key),
            size: data.len() as u64,
        })
    }
}
