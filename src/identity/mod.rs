//! Request identity extraction.
//!
//! Credentials arrive in several historical shapes: a signed session token
//! (JWT), a bearer value that is a raw user reference, or a legacy `uid`
//! cookie. Each shape is a [`CredentialProvider`]; the extractor tries them
//! in a fixed priority order and returns the first resolution. No
//! credential resolving means unauthenticated (HTTP 401 at the API
//! boundary), never a default guest role.

mod providers;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::JwtConfig;

pub use providers::{BearerUserProvider, LegacyCookieProvider, SessionTokenProvider};

/// The authenticated caller as seen by every permission check.
///
/// `group_id` is 0 when the user has no group; 0 and NULL are the same
/// thing everywhere downstream and must never be read as membership in some
/// default group.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    /// Canonical role name (already through the role normalizer).
    pub role: String,
    pub group_id: i64,
    pub email: Option<String>,
}

impl Identity {
    /// Group id in the form scope evaluation expects.
    pub fn group(&self) -> Option<i64> {
        if self.group_id == 0 {
            None
        } else {
            Some(self.group_id)
        }
    }
}

/// One way of turning request headers into an identity. Implementations
/// must treat their own failures (bad token, unknown user, store error) as
/// "not mine" and return `None` so the next provider gets a chance.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn try_resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Ordered provider chain. First success wins.
pub struct IdentityExtractor {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl IdentityExtractor {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// The production chain: session JWT, then bearer user reference, then
    /// the legacy cookie.
    pub fn with_defaults(pool: SqlitePool, jwt: Arc<JwtConfig>) -> Self {
        Self::new(vec![
            Arc::new(SessionTokenProvider::new(pool.clone(), jwt)),
            Arc::new(BearerUserProvider::new(pool.clone())),
            Arc::new(LegacyCookieProvider::new(pool)),
        ])
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        for provider in &self.providers {
            if let Some(identity) = provider.try_resolve(headers).await {
                tracing::debug!(
                    provider = provider.name(),
                    user_id = %identity.user_id,
                    role = %identity.role,
                    "identity resolved"
                );
                return Some(identity);
            }
        }
        None
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .identity
            .resolve(&parts.headers)
            .await
            .ok_or_else(|| AppError::unauthorized("no valid credentials"))
    }
}
