/// Import job submission.
///
/// Turns a raw request into exactly one job source, persists the job in
/// `pending`, publishes its id and marks it `queued`. The row is always
/// durable before publish is attempted; a job whose publish failed stays
/// `pending` until `requeue_pending` picks it up.
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::dispatch::{DispatchQueue, ImportTask};
use crate::error::{ImportError, Result};
use crate::sources::public_url;
use crate::state::models::{JobSource, NewImportJob};
use crate::state::JobRecordStore;
use crate::storage::{self, StorageBackend};

/// An attached file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content: Bytes,
}

/// Parameters of a create request. Blank strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub url: Option<String>,
    pub table_copy: Option<String>,
    pub sql: Option<String>,
    pub file: Option<Upload>,
    pub table_name: Option<String>,
    pub table_id: Option<String>,
    pub append: bool,
    pub service_name: Option<String>,
    pub service_item_id: Option<String>,
}

/// `Some` only for non-blank values.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Clone)]
pub struct ImportGateway {
    jobs: JobRecordStore,
    queue: Arc<dyn DispatchQueue>,
    storage: Arc<dyn StorageBackend>,
}

impl ImportGateway {
    pub fn new(jobs: JobRecordStore, queue: Arc<dyn DispatchQueue>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { jobs, queue, storage }
    }

    pub fn jobs(&self) -> &JobRecordStore {
        &self.jobs
    }

    /// Create and dispatch a job, returning its id without waiting for the
    /// worker.
    pub async fn submit(&self, request: ImportRequest, user_id: Uuid) -> Result<Uuid> {
        let new_job = self.normalize(request, user_id).await?;
        let job = self.jobs.create(new_job).await?;
        self.dispatch(job.id).await;
        Ok(job.id)
    }

    /// Reconciliation sweep: republish jobs that have been `pending` for
    /// longer than `older_than`. Returns how many were queued.
    pub async fn requeue_pending(&self, older_than: Duration) -> Result<usize> {
        let stale = self.jobs.pending_before(Utc::now() - older_than).await?;
        let mut queued = 0;
        for id in stale {
            if self.dispatch(id).await {
                queued += 1;
            }
        }
        info!(queued, "Pending import jobs requeued");
        Ok(queued)
    }

    /// Publish, then mark queued. Failures leave the job `pending`.
    async fn dispatch(&self, job_id: Uuid) -> bool {
        if let Err(e) = self.queue.publish(ImportTask { job_id }).await {
            error!(job_id = %job_id, queue = self.queue.name(), error = %e, "Publish failed, job left pending");
            return false;
        }

        match self.jobs.mark_queued(job_id).await {
            Ok(queued) => {
                info!(job_id = %job_id, queued, "Import job published");
                true
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job published but not marked queued");
                true
            }
        }
    }

    /// First explicit source wins in the order url, table_copy, sql; an
    /// attached file is the fallback.
    async fn normalize(&self, request: ImportRequest, user_id: Uuid) -> Result<NewImportJob> {
        let url = present(request.url);

        let source = if let Some(url) = url.clone() {
            JobSource::Url(url)
        } else if let Some(table) = present(request.table_copy) {
            JobSource::TableCopy(table)
        } else if let Some(sql) = present(request.sql) {
            JobSource::Query(sql)
        } else if let Some(file) = request.file {
            let stored = storage::store(self.storage.as_ref(), &file.filename, &file.content).await?;
            JobSource::Upload(stored.reference)
        } else {
            return Err(ImportError::InvalidRequest(
                "one of url, table_copy, sql or a file is required".into(),
            ));
        };

        let service_name = present(request.service_name)
            .or_else(|| url.as_ref().map(|_| public_url::SERVICE_NAME.to_string()));
        let service_item_id = present(request.service_item_id).or(url);

        Ok(NewImportJob {
            user_id,
            source,
            service_name,
            service_item_id,
            table_name: present(request.table_name),
            table_id: present(request.table_id),
            append: request.append,
        })
    }
}
