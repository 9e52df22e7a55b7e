/// Repository layer: typed storage for import jobs and OAuth tokens.
///
/// PostgreSQL queries use sqlx runtime-checked queries (not compile-time
/// checked) so builds do not need a live database. Every state change is a
/// conditional UPDATE keyed on the current state, which gives a single
/// writer per job id without explicit locks.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::*;
use crate::error::Result;

/// Durable store of import jobs.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &ImportJob) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<ImportJob>>;

    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Set `to` only if the job is currently in `from`. Returns the updated
    /// job, or `None` when the precondition did not hold.
    async fn compare_and_set(
        &self,
        id: Uuid,
        from: JobState,
        to: JobState,
        error_info: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<ImportJob>>;

    /// Fail the job with `error_info` if it is queued or running and its last
    /// activity is older than `cutoff`.
    async fn fail_if_inactive_since(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        error_info: &str,
    ) -> Result<Option<ImportJob>>;

    /// Advance `last_activity_at` on a non-terminal job.
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Ids of jobs still `pending` that were created before `cutoff`.
    async fn pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

/// Per-user OAuth token store; at most one token per (user, service).
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user_id: Uuid, service: &str) -> Result<Option<OAuthToken>>;

    /// Insert or replace the token for the pair.
    async fn put(&self, user_id: Uuid, service: &str, token: &str) -> Result<OAuthToken>;

    /// Remove the token. Returns whether one was present.
    async fn remove(&self, user_id: Uuid, service: &str) -> Result<bool>;
}

const JOB_COLUMNS: &str = "id, user_id, source_kind, source_value, service_name, service_item_id, \
     table_name, table_id, append, state, error_info, created_at, last_activity_at";

fn into_job(row: Option<JobRow>) -> Result<Option<ImportJob>> {
    row.map(ImportJob::try_from).transpose()
}

// ── Import Jobs ──

#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: &ImportJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO import_jobs
            (id, user_id, source_kind, source_value, service_name, service_item_id,
             table_name, table_id, append, state, error_info, created_at, last_activity_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(job.source.kind())
        .bind(job.source.value())
        .bind(&job.service_name)
        .bind(&job.service_item_id)
        .bind(&job.table_name)
        .bind(&job.table_id)
        .bind(job.append)
        .bind(job.state)
        .bind(&job.error_info)
        .bind(job.created_at)
        .bind(job.last_activity_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ImportJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        into_job(row)
    }

    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM import_jobs WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        from: JobState,
        to: JobState,
        error_info: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<ImportJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE import_jobs
            SET state = $3, error_info = $4, last_activity_at = $5
            WHERE id = $1 AND state = $2
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(error_info)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        into_job(row)
    }

    async fn fail_if_inactive_since(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        error_info: &str,
    ) -> Result<Option<ImportJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE import_jobs
            SET state = 'failed', error_info = $3
            WHERE id = $1
              AND state IN ('queued', 'running')
              AND last_activity_at < $2
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(cutoff)
        .bind(error_info)
        .fetch_optional(&self.pool)
        .await?;

        into_job(row)
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs SET last_activity_at = $2
            WHERE id = $1 AND state NOT IN ('complete', 'failed')
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM import_jobs WHERE state = 'pending' AND created_at < $1 ORDER BY created_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

// ── OAuth Tokens ──

#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn get(&self, user_id: Uuid, service: &str) -> Result<Option<OAuthToken>> {
        let token = sqlx::query_as::<_, OAuthToken>(
            "SELECT user_id, service, token, created_at FROM oauth_tokens WHERE user_id = $1 AND service = $2",
        )
        .bind(user_id)
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn put(&self, user_id: Uuid, service: &str, token: &str) -> Result<OAuthToken> {
        let stored = sqlx::query_as::<_, OAuthToken>(
            r#"
            INSERT INTO oauth_tokens (user_id, service, token, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, service)
            DO UPDATE SET token = EXCLUDED.token, created_at = EXCLUDED.created_at
            RETURNING user_id, service, token, created_at
            "#,
        )
        .bind(user_id)
        .bind(service)
        .bind(token)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn remove(&self, user_id: Uuid, service: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE user_id = $1 AND service = $2")
            .bind(user_id)
            .bind(service)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
