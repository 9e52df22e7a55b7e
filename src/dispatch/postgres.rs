/// Dispatch through the worker pool's `background_jobs` table.
///
/// Workers poll the table with `FOR UPDATE SKIP LOCKED` and retry with
/// backoff, so a row that is picked up twice is expected.
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use super::{DispatchQueue, ImportTask, IMPORT_JOB_TYPE};
use crate::error::{ImportError, Result};

#[derive(Clone)]
pub struct PgDispatchQueue {
    pool: PgPool,
    priority: i16,
}

impl PgDispatchQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, priority: 0 }
    }
}

#[async_trait]
impl DispatchQueue for PgDispatchQueue {
    fn name(&self) -> &str {
        "postgres"
    }

    #[instrument(name = "dispatch.publish", skip(self), fields(job_id = %task.job_id))]
    async fn publish(&self, task: ImportTask) -> Result<()> {
        let data = serde_json::to_value(task).map_err(|e| ImportError::Serialization(e.to_string()))?;

        sqlx::query("INSERT INTO background_jobs (job_type, data, priority) VALUES ($1, $2, $3)")
            .bind(IMPORT_JOB_TYPE)
            .bind(data)
            .bind(self.priority)
            .execute(&self.pool)
            .await
            .map_err(|e| ImportError::Dispatch(e.to_string()))?;

        Ok(())
    }
}
