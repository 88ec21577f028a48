use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{DecisionSource, PermissionType, Scope};
use crate::errors::{AppError, AppResult};
use crate::identity::Identity;
use crate::models::short_url::{ShortUrl, ShortUrlCreateRequest};

use super::qr_codes::ensure_slug_available;

const RESOURCE: &str = "short_url";

#[utoipa::path(
    get,
    path = "/api/short-urls",
    tag = "Short URLs",
    responses(
        (status = 200, description = "Short URLs visible to the caller", body = Vec<ShortUrl>),
        (status = 401, description = "No valid credentials"),
        (status = 403, description = "Denied"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list(State(state): State<AppState>, identity: Identity) -> AppResult<Json<Vec<ShortUrl>>> {
    let decision = state
        .permissions
        .decide_collection(identity.user_id, &identity.role, RESOURCE, PermissionType::Read)
        .await;
    if !decision.allowed {
        return Err(AppError::forbidden("not allowed to list short urls"));
    }

    let base = "SELECT id, slug, target_url, owner_id, group_id, created_at, updated_at \
                FROM short_urls WHERE deleted_at IS NULL";
    let rows: Vec<SqliteRow> = match decision.source {
        DecisionSource::Record { scope: Scope::Own, .. } => {
            sqlx::query(&format!("{base} AND (owner_id = ? OR created_by = ?) ORDER BY created_at DESC"))
                .bind(identity.user_id.to_string())
                .bind(identity.user_id.to_string())
                .fetch_all(&state.pool)
                .await?
        }
        DecisionSource::Record { scope: Scope::Group, .. } => match identity.group() {
            Some(group) => {
                sqlx::query(&format!("{base} AND group_id = ? ORDER BY created_at DESC"))
                    .bind(group)
                    .fetch_all(&state.pool)
                    .await?
            }
            None => sqlx::query(&format!("{base} ORDER BY created_at DESC")).fetch_all(&state.pool).await?,
        },
        _ => sqlx::query(&format!("{base} ORDER BY created_at DESC")).fetch_all(&state.pool).await?,
    };

    Ok(Json(rows.iter().map(ShortUrl::from_row).collect()))
}

#[utoipa::path(
    post,
    path = "/api/short-urls",
    tag = "Short URLs",
    request_body = ShortUrlCreateRequest,
    responses(
        (status = 201, description = "Short URL created", body = ShortUrl),
        (status = 401, description = "No valid credentials"),
        (status = 403, description = "Denied"),
        (status = 409, description = "Slug already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    Json(payload): Json<ShortUrlCreateRequest>,
) -> AppResult<(StatusCode, Json<ShortUrl>)> {
    let allowed = state
        .permissions
        .check_permission(
            identity.user_id,
            &identity.role,
            identity.group(),
            RESOURCE,
            PermissionType::Create,
            None,
            None,
        )
        .await;
    if !allowed {
        return Err(AppError::forbidden("not allowed to create short urls"));
    }

    ensure_slug_available(&state, "short_urls", &payload.slug).await?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let group_id = payload.group_id.or(identity.group());

    sqlx::query(
        "INSERT INTO short_urls (id, slug, target_url, owner_id, created_by, group_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&payload.slug)
    .bind(&payload.target_url)
    .bind(identity.user_id.to_string())
    .bind(identity.user_id.to_string())
    .bind(group_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let short_url = ShortUrl {
        id,
        slug: payload.slug,
        target_url: payload.target_url,
        owner_id: Some(identity.user_id),
        group_id,
        created_at: now,
        updated_at: now,
    };

    Ok((StatusCode::CREATED, Json(short_url)))
}

#[utoipa::path(
    delete,
    path = "/api/short-urls/{id}",
    tag = "Short URLs",
    params(("id" = Uuid, Path, description = "Short URL ID")),
    responses(
        (status = 204, description = "Short URL deleted"),
        (status = 401, description = "No valid credentials"),
        (status = 403, description = "Denied"),
        (status = 404, description = "Not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM short_urls WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_one(&state.pool)
    .await?;
    if exists == 0 {
        return Err(AppError::not_found("short url not found"));
    }

    let decision = state
        .permissions
        .decide_for_resource(
            identity.user_id,
            &identity.role,
            identity.group(),
            RESOURCE,
            PermissionType::Delete,
            Some(id),
        )
        .await;
    if !decision.allowed {
        return Err(AppError::forbidden("not allowed to delete this short url"));
    }

    sqlx::query("UPDATE short_urls SET deleted_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
