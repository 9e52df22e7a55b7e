/// S3 upload backend.
///
/// Objects are written with a public-read ACL and handed out as presigned
/// GET URLs valid for `url_ttl_secs`. S3 offers read-after-write consistency
/// for new keys, so the URL works as soon as `put` returns.
///
/// Configuration requires:
/// - Bucket name and region
/// - Access key ID and secret access key
/// - Optional endpoint URL for S3-compatible services
use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use serde::Deserialize;

use super::{StorageBackend, UploadResult};
use crate::error::{ImportError, Result};

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_url_ttl() -> u64 {
    3600
}

/// Configuration for the S3 upload bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    #[serde(default = "default_url_ttl")]
    pub url_ttl_secs: u64,
}

impl S3Config {
    /// Both keys present and non-empty.
    pub fn has_credentials(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.access_key_id) && present(&self.secret_access_key)
    }
}

/// Upload backend using the S3 API.
pub struct S3Backend {
    client: S3Client,
    bucket: String,
    url_ttl: Duration,
}

impl S3Backend {
    /// Create a new S3 backend from configuration.
    pub fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone().unwrap_or_default(),
            config.secret_access_key.clone().unwrap_or_default(),
            None,
            None,
            "import-gateway",
        );

        let mut builder = S3ConfigBuilder::new()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            url_ttl: Duration::from_secs(config.url_ttl_secs),
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        "S3"
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<UploadResult> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(data.to_vec()))
            .content_length(data.len() as i64)
            .send()
            .await
            .map_err(|e| ImportError::Storage(format!("S3 put failed: {e}")))?;

        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| ImportError::Storage(format!("Invalid URL TTL: {e}")))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| ImportError::Storage(format!("S3 presign failed: {e}")))?;

        Ok(UploadResult {
            storage_key: key.to_string(),
            reference: presigned.uri().to_string(),
            size: data.len() as u64,
        })
    }
}
