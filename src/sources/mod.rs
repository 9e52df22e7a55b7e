/// Pluggable data source abstraction.
///
/// Each provider implements `DataSource`. Providers that speak OAuth report
/// `supports_oauth() == true` and override the OAuth operations:
/// - token validity probe
/// - authorization URL generation
/// - authorization-code exchange
///
/// The defaults fail with `UnsupportedOperation` so a provider only
/// implements what its capability set allows.
pub mod google_drive;
pub mod public_url;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SourcesConfig;
use crate::error::{ImportError, Result};

pub use google_drive::GoogleDrive;
pub use public_url::PublicUrl;

/// A remote resource a user can import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Provider-specific id, used as `service_item_id`.
    pub id: String,
    pub title: String,
    pub filename: Option<String>,
    /// Provider service name.
    pub service: String,
    pub checksum: Option<String>,
    pub size: Option<u64>,
    /// Last modified timestamp (RFC 3339).
    pub updated_at: Option<String>,
}

fn unsupported(source: &(impl DataSource + ?Sized)) -> ImportError {
    ImportError::UnsupportedOperation(format!(
        "Datasource {} does not support OAuth",
        source.name()
    ))
}

/// Trait for pluggable data sources.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Service identifier (e.g., "google_drive").
    fn name(&self) -> &str;

    fn supports_oauth(&self) -> bool {
        false
    }

    /// Whether `token` still grants access. Transport trouble surfaces as
    /// `DataDownload`, a dead token as `TokenExpiredOrInvalid`.
    async fn token_valid(&self, _token: &str) -> Result<bool> {
        Err(unsupported(self))
    }

    /// Importable resources visible with `token`.
    async fn list_resources(&self, _token: &str) -> Result<Vec<ResourceDescriptor>> {
        Err(ImportError::UnsupportedOperation(format!(
            "Datasource {} does not list resources",
            self.name()
        )))
    }

    /// URL the user visits to grant access.
    fn auth_url(&self) -> Result<String> {
        Err(unsupported(self))
    }

    /// Trade an authorization code for a token. Rejection is `Auth`.
    async fn exchange_code(&self, _code: &str) -> Result<String> {
        Err(unsupported(self))
    }
}

/// Service name → adapter.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn DataSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the generic URL source plus every configured provider.
    pub fn from_config(config: &SourcesConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PublicUrl));
        if let Some(drive) = &config.google_drive {
            registry.register(Arc::new(GoogleDrive::new(drive.clone())));
        }
        registry
    }

    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn get(&self, service: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(service).cloned()
    }

    pub fn services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
