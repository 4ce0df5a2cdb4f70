//! Password hashing, session issuance, and the authenticated-actor
//! extractor.
//!
//! Tokens are opaque random values: the access token names a `sessions`
//! document with a TTL, the refresh token is persisted on the user. Both are
//! delivered as secure, HTTP-only cookies; the extractor also accepts a
//! Bearer header. Handlers receive the actor as an explicit [`AuthUser`]
//! argument, never through ambient request state.

use crate::errors::ApiError;
use crate::models::{ObjectId, Session, User};
use crate::services::document_store::{DocumentStore, StoreResult, collections};
use crate::services::pipeline::Filter;
use crate::state::AppState;
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use uuid::Uuid;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Access sessions live for a day; refresh cookies for ten.
pub const ACCESS_TTL_SECS: i64 = 60 * 60 * 24;
pub const REFRESH_TTL_SECS: i64 = 60 * 60 * 24 * 10;

/// Hash a password for storage.
pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            tracing::error!("password hashing failed: {err}");
            ApiError::internal("Failed to process credentials")
        })
}

/// Check a password against a stored hash. Malformed hashes count as a
/// mismatch rather than an error.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// 256 bits of randomness, URL-safe base64.
pub fn generate_token() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Create a session document for a freshly authenticated user.
pub async fn issue_session(store: &DocumentStore, user: ObjectId) -> StoreResult<Session> {
    let now = Utc::now();
    let session = Session {
        id: ObjectId::new(),
        token: generate_token(),
        user,
        expires_at: now + Duration::seconds(ACCESS_TTL_SECS),
        created_at: now,
    };
    store.insert(collections::SESSIONS, &session, &[]).await?;
    Ok(session)
}

/// Render a secure, HTTP-only session cookie.
pub fn session_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!("{name}={value}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={max_age_secs}")
}

/// Render a cookie that clears `name` on the client.
pub fn clear_cookie(name: &str) -> String {
    session_cookie(name, "", 0)
}

/// Read one cookie value from the request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Read a Bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// The authenticated actor for the current request.
pub struct AuthUser {
    pub user: User,
    pub session_id: ObjectId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, ACCESS_COOKIE)
            .or_else(|| bearer_token(&parts.headers))
            .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

        let session: Session = state
            .store
            .find_one(collections::SESSIONS, &Filter::new().eq("token", token))
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;
        if session.expires_at <= Utc::now() {
            return Err(ApiError::unauthorized("Access token expired"));
        }

        let user: User = state
            .store
            .find_by_id(collections::USERS, session.user)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;

        Ok(AuthUser {
            user,
            session_id: session.id,
        })
    }
}
