/// Persistence layer for the import gateway.
///
/// Owns the PostgreSQL pool plus the two repositories the core needs:
/// - Import jobs and their lifecycle (`JobRepository`)
/// - Per-user OAuth tokens (`TokenStore`)
///
/// Each repository also has an in-process implementation used when no
/// database is configured.
pub mod memory;
pub mod models;
pub mod records;
pub mod repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{ImportError, Result};

pub use memory::{MemoryJobRepository, MemoryTokenStore};
pub use records::{JobRecordStore, JobView};
pub use repository::{JobRepository, PgJobRepository, PgTokenStore, TokenStore};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ImportError::Config(format!("Migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
