/// Hand-off point between job creation and the worker pool.
///
/// Delivery is at-least-once: a worker may see the same job id more than
/// once and must treat an already terminal job as a no-op
/// (`JobRecordStore::transition` returns `false` in that case). The gateway
/// only publishes after the job row is durable.
pub mod channel;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

pub use channel::ChannelDispatchQueue;
pub use postgres::PgDispatchQueue;

/// Job type name the worker pool registers for imports.
pub const IMPORT_JOB_TYPE: &str = "importer_jobs";

/// Payload delivered to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTask {
    pub job_id: Uuid,
}

#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Human-readable name of this queue backend.
    fn name(&self) -> &str;

    async fn publish(&self, task: ImportTask) -> Result<()>;
}
