/// OAuth session manager.
///
/// Resolves a (user, service) pair to the stored token and the registered
/// adapter, and runs every adapter call through `guard`: when the provider
/// reports the token as dead, the token is deleted before the error is
/// returned, whichever operation hit it.
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ImportError, Result};
use crate::sources::{DataSource, ResourceDescriptor, SourceRegistry};
use crate::state::models::OAuthToken;
use crate::state::TokenStore;

/// A stored token bound to the adapter that understands it.
#[derive(Clone)]
pub struct ResolvedSource {
    pub token: OAuthToken,
    pub source: Arc<dyn DataSource>,
}

#[derive(Clone)]
pub struct SessionManager {
    tokens: Arc<dyn TokenStore>,
    sources: SourceRegistry,
}

impl SessionManager {
    pub fn new(tokens: Arc<dyn TokenStore>, sources: SourceRegistry) -> Self {
        Self { tokens, sources }
    }

    /// `None` when the user has no token for the service or the service has
    /// no registered adapter.
    pub async fn resolve(&self, user_id: Uuid, service: &str) -> Result<Option<ResolvedSource>> {
        let Some(source) = self.sources.get(service) else {
            return Ok(None);
        };
        let token = self.tokens.get(user_id, service).await?;
        Ok(token.map(|token| ResolvedSource { token, source }))
    }

    pub async fn store(&self, user_id: Uuid, service: &str, token: &str) -> Result<OAuthToken> {
        let stored = self.tokens.put(user_id, service, token).await?;
        info!(user_id = %user_id, service, "OAuth token stored");
        Ok(stored)
    }

    pub async fn invalidate(&self, user_id: Uuid, service: &str) -> Result<()> {
        if self.tokens.remove(user_id, service).await? {
            warn!(user_id = %user_id, service, "OAuth token invalidated");
        }
        Ok(())
    }

    /// Is the user's token for `service` still usable?
    ///
    /// No token configured is a plain `false`, as is a transient download
    /// failure while probing the provider.
    pub async fn token_valid(&self, user_id: Uuid, service: &str) -> Result<bool> {
        let Some(resolved) = self.resolve(user_id, service).await? else {
            return Ok(false);
        };
        require_oauth(resolved.source.as_ref())?;

        let outcome = resolved.source.token_valid(&resolved.token.token).await;
        match self.guard(user_id, service, outcome).await {
            Err(e) if e.is_data_download() => {
                warn!(service, error = %e, "Token validity probe failed, reporting invalid");
                Ok(false)
            }
            other => other,
        }
    }

    pub async fn list_resources(&self, user_id: Uuid, service: &str) -> Result<Vec<ResourceDescriptor>> {
        let resolved = self
            .resolve(user_id, service)
            .await?
            .ok_or_else(|| ImportError::Auth(format!("No oauth set for service {service}")))?;

        let outcome = resolved.source.list_resources(&resolved.token.token).await;
        self.guard(user_id, service, outcome).await
    }

    pub async fn auth_url(&self, user_id: Uuid, service: &str) -> Result<String> {
        let source = self.oauth_source(service)?;
        let outcome = source.auth_url();
        self.guard(user_id, service, outcome).await
    }

    /// Exchange `code` and store the resulting token. A rejected code yields
    /// `Ok(false)` and leaves the token store untouched.
    pub async fn exchange_code(&self, user_id: Uuid, service: &str, code: &str) -> Result<bool> {
        let source = self.oauth_source(service)?;
        if code.trim().is_empty() {
            return Err(ImportError::InvalidRequest(format!(
                "Missing oauth verification code for service {service}"
            )));
        }

        let outcome = source.exchange_code(code).await;
        match self.guard(user_id, service, outcome).await {
            Ok(token) => {
                self.store(user_id, service, &token).await?;
                Ok(true)
            }
            Err(ImportError::Auth(reason)) => {
                info!(user_id = %user_id, service, reason = %reason, "OAuth code rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Registered adapter with OAuth capability.
    fn oauth_source(&self, service: &str) -> Result<Arc<dyn DataSource>> {
        let source = self
            .sources
            .get(service)
            .ok_or_else(|| ImportError::Auth(format!("Couldn't fetch datasource for service {service}")))?;
        require_oauth(source.as_ref())?;
        Ok(source)
    }

    async fn guard<T>(&self, user_id: Uuid, service: &str, outcome: Result<T>) -> Result<T> {
        if matches!(&outcome, Err(e) if e.is_token_expired()) {
            self.invalidate(user_id, service).await?;
        }
        outcome
    }
}

fn require_oauth(source: &dyn DataSource) -> Result<()> {
    if source.supports_oauth() {
        Ok(())
    } else {
        Err(ImportError::UnsupportedOperation(format!(
            "Datasource {} does not support OAuth",
            source.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::PublicUrl;
    use crate::state::MemoryTokenStore;
    use async_trait::async_trait;

    #[derive(Clone, Copy)]
    enum Outcome {
        Ok,
        Expired,
        Download,
        Rejected,
    }

    struct FakeSource(Outcome);

    impl FakeSource {
        fn fail<T>(&self) -> Result<T> {
            Err(match self.0 {
                Outcome::Expired => ImportError::TokenExpiredOrInvalid("fake".into()),
                Outcome::Download => ImportError::DataDownload("timeout".into()),
                Outcome::Rejected => ImportError::Auth("invalid_grant".into()),
                Outcome::Ok => unreachable!(),
            })
        }
    }

    #[async_trait]
    impl DataSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        fn supports_oauth(&self) -> bool {
            true
        }

        async fn token_valid(&self, _token: &str) -> Result<bool> {
            match self.0 {
                Outcome::Ok => Ok(true),
                _ => self.fail(),
            }
        }

        async fn list_resources(&self, _token: &str) -> Result<Vec<ResourceDescriptor>> {
            match self.0 {
                Outcome::Ok => Ok(vec![]),
                _ => self.fail(),
            }
        }

        fn auth_url(&self) -> Result<String> {
            Ok("https://fake/auth".into())
        }

        async fn exchange_code(&self, code: &str) -> Result<String> {
            match self.0 {
                Outcome::Ok => Ok(format!("token-for-{code}")),
                _ => self.fail(),
            }
        }
    }

    fn manager(outcome: Outcome) -> (Arc<MemoryTokenStore>, SessionManager) {
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut sources = SourceRegistry::new();
        sources.register(Arc::new(FakeSource(outcome)));
        sources.register(Arc::new(PublicUrl));
        (tokens.clone(), SessionManager::new(tokens, sources))
    }

    #[tokio::test]
    async fn test_token_valid_without_token_is_false() {
        let (_, manager) = manager(Outcome::Ok);
        assert!(!manager.token_valid(Uuid::new_v4(), "fake").await.unwrap());
        assert!(!manager.token_valid(Uuid::new_v4(), "unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_token_valid_swallows_download_error() {
        let (tokens, manager) = manager(Outcome::Download);
        let user = Uuid::new_v4();
        tokens.put(user, "fake", "t").await.unwrap();

        assert!(!manager.token_valid(user, "fake").await.unwrap());
        assert!(tokens.get(user, "fake").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_token_is_removed_for_every_operation() {
        let (tokens, manager) = manager(Outcome::Expired);
        let user = Uuid::new_v4();

        tokens.put(user, "fake", "t").await.unwrap();
        assert!(manager.token_valid(user, "fake").await.unwrap_err().is_token_expired());
        assert!(tokens.get(user, "fake").await.unwrap().is_none());

        tokens.put(user, "fake", "t").await.unwrap();
        assert!(manager.list_resources(user, "fake").await.unwrap_err().is_token_expired());
        assert!(tokens.get(user, "fake").await.unwrap().is_none());

        tokens.put(user, "fake", "t").await.unwrap();
        assert!(manager.exchange_code(user, "fake", "c").await.unwrap_err().is_token_expired());
        assert!(tokens.get(user, "fake").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_resources_without_token_is_auth_error() {
        let (_, manager) = manager(Outcome::Ok);
        let err = manager.list_resources(Uuid::new_v4(), "fake").await.unwrap_err();
        assert!(matches!(err, ImportError::Auth(_)));
    }

    #[tokio::test]
    async fn test_non_oauth_source_is_unsupported() {
        let (tokens, manager) = manager(Outcome::Ok);
        let user = Uuid::new_v4();
        tokens.put(user, "generic", "t").await.unwrap();

        assert!(matches!(
            manager.token_valid(user, "generic").await,
            Err(ImportError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            manager.auth_url(user, "generic").await,
            Err(ImportError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            manager.exchange_code(user, "generic", "c").await,
            Err(ImportError::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_stores_token_only_on_success() {
        let user = Uuid::new_v4();

        let (tokens, ok) = manager(Outcome::Ok);
        assert!(ok.exchange_code(user, "fake", "abc").await.unwrap());
        assert_eq!(tokens.get(user, "fake").await.unwrap().unwrap().token, "token-for-abc");

        let (tokens, rejected) = manager(Outcome::Rejected);
        assert!(!rejected.exchange_code(user, "fake", "abc").await.unwrap());
        assert!(tokens.get(user, "fake").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_requires_code() {
        let (_, manager) = manager(Outcome::Ok);
        let err = manager.exchange_code(Uuid::new_v4(), "fake", " ").await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_auth_url_needs_registered_source_only() {
        let (_, manager) = manager(Outcome::Ok);
        assert_eq!(manager.auth_url(Uuid::new_v4(), "fake").await.unwrap(), "https://fake/auth");
        assert!(matches!(
            manager.auth_url(Uuid::new_v4(), "unknown").await,
            Err(ImportError::Auth(_))
        ));
    }
}
