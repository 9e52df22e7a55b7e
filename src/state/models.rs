/// Import job records.
///
/// `ImportJob` is the domain shape handed to the gateway and the HTTP layer;
/// `JobRow` is the flat PostgreSQL row it round-trips through.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{ImportError, Result};

/// `error_info` written when a job is force-failed for inactivity.
pub const STUCK_ERROR: &str = "stuck";

/// Lifecycle state of an import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "import_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Queued,
    Running,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }

    /// States the stuck detector watches.
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Queued | JobState::Running)
    }

    fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Queued => 1,
            JobState::Running => 2,
            JobState::Complete | JobState::Failed => 3,
        }
    }

    /// States only move forward and never leave a terminal state.
    pub fn can_transition_to(self, next: JobState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        }
    }
}

/// The single origin of data for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum JobSource {
    /// Remote URL fetched by the worker.
    Url(String),
    /// Reference returned by the blob store for an uploaded file.
    Upload(String),
    /// SQL query whose result becomes the new table.
    Query(String),
    /// Existing table to copy.
    TableCopy(String),
}

impl JobSource {
    pub fn kind(&self) -> &'static str {
        match self {
            JobSource::Url(_) => "url",
            JobSource::Upload(_) => "upload",
            JobSource::Query(_) => "query",
            JobSource::TableCopy(_) => "table_copy",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            JobSource::Url(v) | JobSource::Upload(v) | JobSource::Query(v) | JobSource::TableCopy(v) => v,
        }
    }

    pub fn from_parts(kind: &str, value: String) -> Result<Self> {
        match kind {
            "url" => Ok(JobSource::Url(value)),
            "upload" => Ok(JobSource::Upload(value)),
            "query" => Ok(JobSource::Query(value)),
            "table_copy" => Ok(JobSource::TableCopy(value)),
            other => Err(ImportError::Serialization(format!(
                "unknown job source kind: {other}"
            ))),
        }
    }
}

/// Everything the gateway decides before a job exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImportJob {
    pub user_id: Uuid,
    pub source: JobSource,
    pub service_name: Option<String>,
    pub service_item_id: Option<String>,
    pub table_name: Option<String>,
    pub table_id: Option<String>,
    pub append: bool,
}

/// A persisted import job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: JobSource,
    pub service_name: Option<String>,
    pub service_item_id: Option<String>,
    pub table_name: Option<String>,
    pub table_id: Option<String>,
    pub append: bool,
    pub state: JobState,
    /// Failure reason, only set when `state` is `Failed`.
    pub error_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ImportJob {
    /// Materialize a new job in `Pending`.
    pub fn create(new: NewImportJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: new.user_id,
            source: new.source,
            service_name: new.service_name,
            service_item_id: new.service_item_id,
            table_name: new.table_name,
            table_id: new.table_id,
            append: new.append,
            state: JobState::Pending,
            error_info: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Active and silent for longer than `max_running`.
    pub fn is_stuck(&self, now: DateTime<Utc>, max_running: chrono::Duration) -> bool {
        self.state.is_active() && now - self.last_activity_at > max_running
    }
}

/// Row layout of the `import_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_kind: String,
    pub source_value: String,
    pub service_name: Option<String>,
    pub service_item_id: Option<String>,
    pub table_name: Option<String>,
    pub table_id: Option<String>,
    pub append: bool,
    pub state: JobState,
    pub error_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for ImportJob {
    type Error = ImportError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(ImportJob {
            id: row.id,
            user_id: row.user_id,
            source: JobSource::from_parts(&row.source_kind, row.source_value)?,
            service_name: row.service_name,
            service_item_id: row.service_item_id,
            table_name: row.table_name,
            table_id: row.table_id,
            append: row.append,
            state: row.state,
            error_info: row.error_info,
            created_at: row.created_at,
            last_activity_at: row.last_activity_at,
        })
    }
}

/// A stored OAuth token for one (user, service) pair.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OAuthToken {
    pub user_id: Uuid,
    /// Service identifier, e.g. "google_drive".
    pub service: String,
    /// Opaque provider token.
    pub token: String,
    pub created_at: DateTime<Utc>,
}
