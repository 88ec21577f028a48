use axum::extract::Query;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Redirect target for routes the guard denies. Echoes the original path
/// and reason code so the dashboard shell can render a useful message.
#[derive(Debug, Deserialize)]
pub struct ForbiddenQuery {
    pub from: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForbiddenResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub async fn forbidden(Query(query): Query<ForbiddenQuery>) -> (StatusCode, Json<ForbiddenResponse>) {
    (
        StatusCode::FORBIDDEN,
        Json(ForbiddenResponse {
            error: "forbidden",
            from: query.from,
            reason: query.reason,
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub error: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub from: Option<String>,
}

/// Redirect target for unauthenticated page loads. Sessions are issued by
/// the identity provider, not this service.
pub async fn login(Query(query): Query<LoginQuery>) -> (StatusCode, Json<LoginResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(LoginResponse {
            error: "unauthorized",
            message: "sign in through the dashboard frontend",
            from: query.from,
        }),
    )
}

pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
