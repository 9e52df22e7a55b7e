/// In-process repositories.
///
/// Used by the server when no database URL is configured and by tests.
/// A single write lock per map makes every compare-and-set atomic.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{ImportJob, JobState, OAuthToken};
use super::repository::{JobRepository, TokenStore};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, ImportJob>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: &ImportJob) -> Result<()> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ImportJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let jobs = self.jobs.read().await;
        let mut owned: Vec<&ImportJob> = jobs.values().filter(|j| j.user_id == user_id).collect();
        owned.sort_by_key(|j| j.created_at);
        Ok(owned.into_iter().map(|j| j.id).collect())
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        from: JobState,
        to: JobState,
        error_info: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<ImportJob>> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.state == from => {
                job.state = to;
                job.error_info = error_info.map(str::to_string);
                job.last_activity_at = at;
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn fail_if_inactive_since(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        error_info: &str,
    ) -> Result<Option<ImportJob>> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.state.is_active() && job.last_activity_at < cutoff => {
                job.state = JobState::Failed;
                job.error_info = Some(error_info.to_string());
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if !job.state.is_terminal() => {
                job.last_activity_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let jobs = self.jobs.read().await;
        let mut pending: Vec<&ImportJob> = jobs
            .values()
            .filter(|j| j.state == JobState::Pending && j.created_at < cutoff)
            .collect();
        pending.sort_by_key(|j| j.created_at);
        Ok(pending.into_iter().map(|j| j.id).collect())
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<(Uuid, String), OAuthToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, user_id: Uuid, service: &str) -> Result<Option<OAuthToken>> {
        Ok(self
            .tokens
            .read()
            .await
            .get(&(user_id, service.to_string()))
            .cloned())
    }

    async fn put(&self, user_id: Uuid, service: &str, token: &str) -> Result<OAuthToken> {
        let stored = OAuthToken {
            user_id,
            service: service.to_string(),
            token: token.to_string(),
            created_at: Utc::now(),
        };
        self.tokens
            .write()
            .await
            .insert((user_id, service.to_string()), stored.clone());
        Ok(stored)
    }

    async fn remove(&self, user_id: Uuid, service: &str) -> Result<bool> {
        Ok(self
            .tokens
            .write()
            .await
            .remove(&(user_id, service.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::models::{JobSource, NewImportJob};

    fn job(user_id: Uuid) -> ImportJob {
        ImportJob::create(
            NewImportJob {
                user_id,
                source: JobSource::Query("select 1".into()),
                service_name: None,
                service_item_id: None,
                table_name: None,
                table_id: None,
                append: false,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_compare_and_set_requires_expected_state() {
        let repo = MemoryJobRepository::new();
        let job = job(Uuid::new_v4());
        repo.insert(&job).await.unwrap();

        let now = Utc::now();
        assert!(repo
            .compare_and_set(job.id, JobState::Queued, JobState::Running, None, now)
            .await
            .unwrap()
            .is_none());
        let updated = repo
            .compare_and_set(job.id, JobState::Pending, JobState::Queued, None, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.state, JobState::Queued);
    }

    #[tokio::test]
    async fn test_list_ids_only_for_owner() {
        let repo = MemoryJobRepository::new();
        let alice = Uuid::new_v4();
        let a = job(alice);
        let b = job(Uuid::new_v4());
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        assert_eq!(repo.list_ids_for_user(alice).await.unwrap(), vec![a.id]);
    }

    #[tokio::test]
    async fn test_token_put_replaces_and_remove_reports_presence() {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();

        store.put(user, "google_drive", "one").await.unwrap();
        store.put(user, "google_drive", "two").await.unwrap();
        assert_eq!(
            store.get(user, "google_drive").await.unwrap().unwrap().token,
            "two"
        );

        assert!(store.remove(user, "google_drive").await.unwrap());
        assert!(!store.remove(user, "google_drive").await.unwrap());
        assert!(store.get(user, "google_drive").await.unwrap().is_none());
    }
}
