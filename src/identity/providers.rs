use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::authz::normalize_role;
use crate::jwt::JwtConfig;

use super::{CredentialProvider, Identity};

const SESSION_COOKIE: &str = "session_token";
const LEGACY_USER_COOKIE: &str = "uid";

fn bearer_value(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key.trim() == name && !value.trim().is_empty() {
                    return Some(value.trim().to_string());
                }
            }
        }
    }
    None
}

/// Load the stored user record behind a credential and shape it into an
/// identity: role name resolved and normalized, missing group represented
/// as 0. Store errors resolve as `None`; the next provider may still
/// succeed and a failed lookup must not turn into a guest identity.
async fn load_identity(pool: &SqlitePool, user_id: Uuid) -> Option<Identity> {
    let row = match sqlx::query(
        r#"
        SELECT u.id, u.email, u.group_id, r.name AS role_name
        FROM users u
        LEFT JOIN roles r ON r.id = u.role_id
        WHERE u.id = ? AND u.deleted_at IS NULL
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await
    {
        Ok(row) => row?,
        Err(err) => {
            tracing::error!(user_id = %user_id, error = %err, "user lookup failed");
            return None;
        }
    };

    let role_name: Option<String> = row.get("role_name");
    let group_id: Option<i64> = row.get("group_id");
    let email: Option<String> = row.get("email");

    Some(Identity {
        user_id,
        role: normalize_role(role_name.as_deref()),
        group_id: group_id.unwrap_or(0),
        email,
    })
}

/// Signed session token (JWT), read from the session cookie or from a
/// bearer value that has JWT shape.
pub struct SessionTokenProvider {
    pool: SqlitePool,
    jwt: Arc<JwtConfig>,
}

impl SessionTokenProvider {
    pub fn new(pool: SqlitePool, jwt: Arc<JwtConfig>) -> Self {
        Self { pool, jwt }
    }

    fn token_from(headers: &HeaderMap) -> Option<String> {
        if let Some(token) = cookie_value(headers, SESSION_COOKIE) {
            return Some(token);
        }
        // A bearer value with two dots is a JWT, not a raw user reference.
        bearer_value(headers)
            .filter(|value| value.matches('.').count() == 2)
            .map(String::from)
    }
}

#[async_trait::async_trait]
impl CredentialProvider for SessionTokenProvider {
    fn name(&self) -> &'static str {
        "session_token"
    }

    async fn try_resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = Self::token_from(headers)?;
        let claims = match self.jwt.decode(&token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "session token rejected");
                return None;
            }
        };
        load_identity(&self.pool, claims.sub).await
    }
}

/// Bearer credential carrying a raw user reference.
pub struct BearerUserProvider {
    pool: SqlitePool,
}

impl BearerUserProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for BearerUserProvider {
    fn name(&self) -> &'static str {
        "bearer_user"
    }

    async fn try_resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let user_id = bearer_value(headers).and_then(|raw| Uuid::parse_str(raw).ok())?;
        load_identity(&self.pool, user_id).await
    }
}

/// Legacy plain cookie holding a user reference. Oldest clients only.
pub struct LegacyCookieProvider {
    pool: SqlitePool,
}

impl LegacyCookieProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for LegacyCookieProvider {
    fn name(&self) -> &'static str {
        "legacy_cookie"
    }

    async fn try_resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let user_id = cookie_value(headers, LEGACY_USER_COOKIE)
            .and_then(|raw| Uuid::parse_str(&raw).ok())?;
        load_identity(&self.pool, user_id).await
    }
}
