/// Session tokens.
///
/// Sessions are issued by the platform's account service; this server only
/// verifies them. `issue_token` exists for operators and tests that need to
/// mint a token with the shared secret.
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ImportError, Result};

/// JWT claims for session tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: usize,
    /// Issued at (Unix timestamp).
    pub iat: usize,
}

/// Issue a JWT token for a user, valid for `ttl_secs`.
pub fn issue_token(user_id: Uuid, secret: &str, ttl_secs: usize) -> Result<String> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + ttl_secs,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ImportError::Auth(format!("JWT encoding failed: {e}")))
}

/// Verify a session token and return the user it names.
pub fn verify_token(token: &str, secret: &str) -> Result<Uuid> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ImportError::Auth(format!("Invalid token: {e}")))?;

    Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ImportError::Auth("Invalid user ID in token".into()))
}
