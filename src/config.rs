/// Runtime configuration.
///
/// Loaded once at startup from an optional TOML file; the binary applies
/// CLI/env overrides on top. Backend choices (database vs memory, S3 vs
/// local disk) are derived from the resolved values and never re-read.
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ImportError, Result};
use crate::storage::s3::S3Config;

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_running_secs() -> u64 {
    3600
}

/// Request body cap for uploads; 0 lifts it.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_local_root() -> PathBuf {
    PathBuf::from("public/uploads")
}

fn default_public_prefix() -> String {
    "/uploads".to_string()
}

fn default_drive_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/drive.readonly".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// PostgreSQL URL. Without it jobs and tokens live in memory.
    pub database_url: Option<String>,
    /// HMAC secret for session JWTs.
    #[serde(default)]
    pub jwt_secret: String,
    /// Seconds a queued/running job may go without activity before it is
    /// considered stuck.
    #[serde(default = "default_max_running_secs")]
    pub max_running_secs: u64,
    /// Largest accepted request body, in bytes. 0 means unlimited.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_root: default_local_root(),
            public_prefix: default_public_prefix(),
            s3: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    pub google_drive: Option<GoogleDriveConfig>,
}

/// OAuth client registration for Google Drive.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleDriveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_drive_scopes")]
    pub scopes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_url: None,
            jwt_secret: String::new(),
            max_running_secs: default_max_running_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            storage: StorageConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ImportError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ImportError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn max_running(&self) -> Result<chrono::Duration> {
        i64::try_from(self.max_running_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                ImportError::Config(format!(
                    "max_running_secs out of range: {}",
                    self.max_running_secs
                ))
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            return Err(ImportError::Config("jwt_secret must be set".into()));
        }
        let prefix = self.storage.public_prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || prefix.is_empty() {
            return Err(ImportError::Config(
                "storage.public_prefix must be an absolute path below /".into(),
            ));
        }
        if self.max_running_secs == 0 {
            return Err(ImportError::Config("max_running_secs must be positive".into()));
        }
        self.max_running()?;
        Ok(())
    }
}
