/// Job record store: lifecycle transitions and stuck-job detection.
///
/// Reads run the stuck detector first, so a worker that died without
/// reporting turns its job into an explicit `failed` the next time anyone
/// looks at it.
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::models::{ImportJob, JobState, NewImportJob, STUCK_ERROR};
use super::repository::JobRepository;
use crate::error::{ImportError, Result};

/// Public view of a job returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: ImportJob,
    /// False once the job has failed.
    pub success: bool,
}

impl From<ImportJob> for JobView {
    fn from(job: ImportJob) -> Self {
        let success = job.state != JobState::Failed;
        Self { job, success }
    }
}

#[derive(Clone)]
pub struct JobRecordStore {
    repo: Arc<dyn JobRepository>,
    max_running: Duration,
}

impl JobRecordStore {
    pub fn new(repo: Arc<dyn JobRepository>, max_running: Duration) -> Self {
        Self { repo, max_running }
    }

    /// Persist a new job in `pending`.
    pub async fn create(&self, new: NewImportJob) -> Result<ImportJob> {
        let job = ImportJob::create(new, Utc::now());
        self.repo.insert(&job).await?;
        info!(job_id = %job.id, user_id = %job.user_id, source = job.source.kind(), "Import job created");
        Ok(job)
    }

    /// Fetch a job, failing it first if it has gone silent.
    pub async fn get(&self, id: Uuid) -> Result<JobView> {
        self.get_at(id, Utc::now()).await
    }

    pub(crate) async fn get_at(&self, id: Uuid, now: DateTime<Utc>) -> Result<JobView> {
        let job = self
            .repo
            .find(id)
            .await?
            .ok_or_else(|| ImportError::NotFound(id.to_string()))?;

        if !job.is_stuck(now, self.max_running) {
            return Ok(job.into());
        }

        // Concurrent readers race on the conditional update; the loser
        // re-reads the winner's result.
        let cutoff = now - self.max_running;
        let job = match self.repo.fail_if_inactive_since(id, cutoff, STUCK_ERROR).await? {
            Some(failed) => {
                warn!(job_id = %id, last_activity_at = %failed.last_activity_at, "Import job stuck, marked as failed");
                failed
            }
            None => self
                .repo
                .find(id)
                .await?
                .ok_or_else(|| ImportError::NotFound(id.to_string()))?,
        };

        Ok(job.into())
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.repo.list_ids_for_user(user_id).await
    }

    /// Called by the gateway once the job id has been published.
    pub async fn mark_queued(&self, id: Uuid) -> Result<bool> {
        let queued = self
            .repo
            .compare_and_set(id, JobState::Pending, JobState::Queued, None, Utc::now())
            .await?
            .is_some();
        Ok(queued)
    }

    /// Move a job forward. Returns `false` without touching the record when
    /// the job is terminal or already past `to`, which makes redelivered
    /// work a no-op.
    pub async fn transition(&self, id: Uuid, to: JobState, error_info: Option<&str>) -> Result<bool> {
        let error_info = if to == JobState::Failed { error_info } else { None };

        loop {
            let job = self
                .repo
                .find(id)
                .await?
                .ok_or_else(|| ImportError::NotFound(id.to_string()))?;

            if !job.state.can_transition_to(to) {
                return Ok(false);
            }

            if self
                .repo
                .compare_and_set(id, job.state, to, error_info, Utc::now())
                .await?
                .is_some()
            {
                info!(job_id = %id, from = job.state.as_str(), to = to.as_str(), "Import job transitioned");
                return Ok(true);
            }
        }
    }

    /// Worker heartbeat.
    pub async fn touch(&self, id: Uuid) -> Result<bool> {
        self.repo.touch(id, Utc::now()).await
    }

    pub async fn pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        self.repo.pending_before(cutoff).await
    }
}
