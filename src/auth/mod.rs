//! Session tokens and password hashing for storefront accounts.
//!
//! Tokens are HS256 JWTs carrying `userId`, `email`, `iat` and `exp`.
//! Handlers that need a signed-in customer take an [`AuthUser`] argument.

mod password;

pub use password::{hash_password, verify_password};

use crate::{errors::ServiceError, AppState};
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates session tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000)),
        }
    }

    /// `None` when no secret is configured.
    pub fn from_secret(secret: Option<&str>, ttl_secs: u64) -> Option<Self> {
        secret
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self::new(s, ttl_secs))
    }

    pub fn issue(&self, user_id: &str, email: Option<&str>) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.encode(&claims)
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, ServiceError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(encoding_failed)
    }

    /// Checks signature and expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::Unauthorized("Token expired".into())
                }
                _ => ServiceError::Unauthorized("Invalid token".into()),
            })
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Signed-in customer resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Signing our own claims can only fail on a server fault, never on client input.
fn encoding_failed(err: jsonwebtoken::errors::Error) -> ServiceError {
    ServiceError::InternalError(format!("token encoding failed: {err}"))
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let tokens = state.token_service()?;
        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".into()))?;
        let claims = tokens.validate(token)?;
        debug!(user_id = %claims.user_id, "Authenticated request");
        Ok(Self {
            user_id: claims.user_id,
            email: claims.email,
        })
    }
}
