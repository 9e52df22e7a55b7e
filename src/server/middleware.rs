/// Authentication extractor.
///
/// Extracts and validates the session JWT from the Authorization header and
/// hands the user id to route handlers.
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use uuid::Uuid;

use super::auth::verify_token;
use super::response::ApiError;
use super::AppState;

/// Authenticated user extracted from JWT.
///
/// Use this as an extractor in route handlers to require authentication:
/// ```ignore
/// async fn handler(user: AuthUser) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Invalid Authorization format"))?;

        let user_id = verify_token(token, &state.jwt_secret)
            .map_err(|e| ApiError::new(StatusCode::UNAUTHORIZED, e.to_string()))?;

        Ok(AuthUser { user_id })
    }
}
