/// REST API routes for imports.
///
/// Job routes report failures through `job_failure`; the four OAuth routes
/// go through `oauth_failure`, so a dead provider token is a 401 no matter
/// which of them hit it.
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::middleware::AuthUser;
use super::response::{job_failure, oauth_failure, ApiError};
use super::AppState;
use crate::error::ImportError;
use crate::gateway::{ImportRequest, Upload};
use crate::sources::ResourceDescriptor;
use crate::state::JobView;

// ─── Health ──────────────────────────────────────────────

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Import Jobs ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ListImportsResponse {
    imports: Vec<Uuid>,
    success: bool,
}

#[derive(Debug, Serialize)]
struct CreateImportResponse {
    item_queue_id: Uuid,
    success: bool,
}

/// Query parameters of a create request. A `filename` turns the raw body
/// into the uploaded file.
#[derive(Debug, Default, Deserialize)]
struct CreateImportParams {
    url: Option<String>,
    filename: Option<String>,
    sql: Option<String>,
    table_copy: Option<String>,
    table_name: Option<String>,
    table_id: Option<String>,
    append: Option<String>,
    service_name: Option<String>,
    service_item_id: Option<String>,
}

impl CreateImportParams {
    fn into_request(self, body: Bytes) -> ImportRequest {
        let file = self
            .filename
            .filter(|name| !name.trim().is_empty() && !body.is_empty())
            .map(|filename| Upload {
                filename,
                content: body,
            });

        ImportRequest {
            url: self.url,
            table_copy: self.table_copy,
            sql: self.sql,
            file,
            table_name: self.table_name,
            table_id: self.table_id,
            append: self.append.as_deref() == Some("true"),
            service_name: self.service_name,
            service_item_id: self.service_item_id,
        }
    }
}

/// GET /api/v1/imports: Ids of the user's import jobs.
async fn list_imports(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListImportsResponse>, ApiError> {
    let imports = state
        .gateway
        .jobs()
        .list_for_user(user.user_id)
        .await
        .map_err(job_failure)?;

    Ok(Json(ListImportsResponse {
        imports,
        success: true,
    }))
}

/// GET /api/v1/imports/{id}: Job view, after stuck detection. Jobs of
/// other users read as unknown.
async fn show_import(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let not_found = || job_failure(ImportError::NotFound(id.clone()));
    let job_id = Uuid::parse_str(&id).map_err(|_| not_found())?;
    let view = state.gateway.jobs().get(job_id).await.map_err(job_failure)?;
    if view.job.user_id != user.user_id {
        return Err(not_found());
    }
    Ok(Json(view))
}

/// POST /api/v1/imports: Create and dispatch an import job.
async fn create_import(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateImportParams>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<CreateImportResponse>, ApiError> {
    let body = body.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
    let item_queue_id = state
        .gateway
        .submit(params.into_request(body), user.user_id)
        .await
        .map_err(job_failure)?;

    Ok(Json(CreateImportResponse {
        item_queue_id,
        success: true,
    }))
}

pub fn import_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/imports", get(list_imports).post(create_import))
        .route("/api/v1/imports/{id}", get(show_import))
}

// ─── Service OAuth ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct TokenValidResponse {
    oauth_valid: bool,
    success: bool,
}

#[derive(Debug, Serialize)]
struct ListFilesResponse {
    files: Vec<ResourceDescriptor>,
    success: bool,
}

#[derive(Debug, Serialize)]
struct AuthUrlResponse {
    url: String,
    success: bool,
}

#[derive(Debug, Serialize)]
struct ValidateCodeResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ValidateCodeParams {
    code: Option<String>,
}

/// GET /api/v1/imports/service/{service}/token_valid
async fn service_token_valid(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<TokenValidResponse>, ApiError> {
    let oauth_valid = state
        .sessions
        .token_valid(user.user_id, &service)
        .await
        .map_err(oauth_failure)?;

    Ok(Json(TokenValidResponse {
        oauth_valid,
        success: true,
    }))
}

/// GET /api/v1/imports/service/{service}/list_files
async fn list_files_for_service(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<ListFilesResponse>, ApiError> {
    let files = state
        .sessions
        .list_resources(user.user_id, &service)
        .await
        .map_err(oauth_failure)?;

    Ok(Json(ListFilesResponse {
        files,
        success: true,
    }))
}

/// GET /api/v1/imports/service/{service}/auth_url
async fn service_auth_url(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    let url = state
        .sessions
        .auth_url(user.user_id, &service)
        .await
        .map_err(oauth_failure)?;

    Ok(Json(AuthUrlResponse { url, success: true }))
}

/// GET /api/v1/imports/service/{service}/validate_code?code=...
async fn validate_service_code(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Query(params): Query<ValidateCodeParams>,
) -> Result<Json<ValidateCodeResponse>, ApiError> {
    let code = params.code.unwrap_or_default();
    let success = state
        .sessions
        .exchange_code(user.user_id, &service, &code)
        .await
        .map_err(oauth_failure)?;

    Ok(Json(ValidateCodeResponse { success }))
}

pub fn service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/imports/service/{service}/token_valid",
            get(service_token_valid),
        )
        .route(
            "/api/v1/imports/service/{service}/list_files",
            get(list_files_for_service),
        )
        .route(
            "/api/v1/imports/service/{service}/auth_url",
            get(service_auth_url),
        )
        .route(
            "/api/v1/imports/service/{service}/validate_code",
            get(validate_service_code),
        )
}
