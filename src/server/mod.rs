/// API server for the import gateway.
///
/// The server is a thin routing layer over the core:
/// - Creates, lists and shows import jobs via `ImportGateway`
/// - Brokers provider OAuth via `SessionManager`
/// - Serves local uploads when no object store is configured
pub mod auth;
pub mod middleware;
pub mod response;
pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::dispatch::{ChannelDispatchQueue, DispatchQueue, PgDispatchQueue};
use crate::error::{ImportError, Result};
use crate::gateway::ImportGateway;
use crate::oauth::SessionManager;
use crate::sources::SourceRegistry;
use crate::state::{
    Database, JobRecordStore, JobRepository, MemoryJobRepository, MemoryTokenStore,
    PgJobRepository, PgTokenStore, TokenStore,
};
use crate::storage;

/// Local upload directory exposed under a URL prefix.
#[derive(Clone, Debug)]
pub struct StaticUploads {
    pub prefix: String,
    pub root: PathBuf,
}

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: ImportGateway,
    pub sessions: SessionManager,
    /// JWT signing secret.
    pub jwt_secret: String,
    pub uploads: Option<StaticUploads>,
    /// Request body cap in bytes; 0 means unlimited.
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire the core from configuration: PostgreSQL-backed stores and queue
    /// when a database URL is set, in-process ones otherwise.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (jobs, tokens, queue): (Arc<dyn JobRepository>, Arc<dyn TokenStore>, Arc<dyn DispatchQueue>) =
            match &config.database_url {
                Some(url) => {
                    let db = Database::connect(url).await?;
                    db.migrate().await?;
                    let pool = db.pool().clone();
                    (
                        Arc::new(PgJobRepository::new(pool.clone())),
                        Arc::new(PgTokenStore::new(pool.clone())),
                        Arc::new(PgDispatchQueue::new(pool)),
                    )
                }
                None => {
                    tracing::warn!("No database configured, jobs and tokens are kept in memory");
                    let (queue, mut rx) = ChannelDispatchQueue::new();
                    // Without a worker pool attached, drain so publishes succeed.
                    tokio::spawn(async move {
                        while let Some(task) = rx.recv().await {
                            tracing::debug!(job_id = %task.job_id, "Dispatched to in-process queue");
                        }
                    });
                    (
                        Arc::new(MemoryJobRepository::new()),
                        Arc::new(MemoryTokenStore::new()),
                        Arc::new(queue),
                    )
                }
            };

        let uploads = match &config.storage.s3 {
            Some(s3) if s3.has_credentials() => None,
            _ => Some(StaticUploads {
                prefix: config.storage.public_prefix.trim_end_matches('/').to_string(),
                root: config.storage.local_root.clone(),
            }),
        };

        let records = JobRecordStore::new(jobs, config.max_running()?);
        let gateway = ImportGateway::new(records, queue, storage::from_config(&config.storage));
        let sessions = SessionManager::new(tokens, SourceRegistry::from_config(&config.sources));

        Ok(Self {
            gateway,
            sessions,
            jwt_secret: config.jwt_secret.clone(),
            uploads,
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let uploads = state.uploads.clone();
    let body_limit = match state.max_upload_bytes {
        0 => DefaultBodyLimit::disable(),
        limit => DefaultBodyLimit::max(limit),
    };

    let mut app = Router::new()
        .merge(routes::health_routes())
        .merge(routes::import_routes().layer(body_limit))
        .merge(routes::service_routes())
        .with_state(Arc::new(state));

    if let Some(uploads) = uploads {
        app = app.nest_service(&uploads.prefix, ServeDir::new(uploads.root));
    }

    app.layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(ImportError::Io)?;

    tracing::info!("import gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(ImportError::Io)?;

    Ok(())
}
