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
use crate::models::qr_code::{QrCode, QrCodeCreateRequest, QrCodeUpdateRequest};

const RESOURCE: &str = "qr_code";

/// List QR codes visible to the caller. The resolved scope narrows the
/// query: own -> the caller's rows, group -> the caller's group, all (and
/// the fail-safe allows) -> unrestricted.
#[utoipa::path(
    get,
    path = "/api/qr-codes",
    tag = "QR Codes",
    responses(
        (status = 200, description = "QR codes visible to the caller", body = Vec<QrCode>),
        (status = 401, description = "No valid credentials"),
        (status = 403, description = "Denied"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list(State(state): State<AppState>, identity: Identity) -> AppResult<Json<Vec<QrCode>>> {
    let decision = state
        .permissions
        .decide_collection(identity.user_id, &identity.role, RESOURCE, PermissionType::Read)
        .await;
    if !decision.allowed {
        return Err(AppError::forbidden("not allowed to list qr codes"));
    }

    let base = "SELECT id, slug, target_url, owner_id, group_id, created_at, updated_at \
                FROM qr_codes WHERE deleted_at IS NULL";
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
            // No group to compare against; same permissive reading as the
            // scope resolver.
            None => sqlx::query(&format!("{base} ORDER BY created_at DESC")).fetch_all(&state.pool).await?,
        },
        _ => sqlx::query(&format!("{base} ORDER BY created_at DESC")).fetch_all(&state.pool).await?,
    };

    Ok(Json(rows.iter().map(QrCode::from_row).collect()))
}

#[utoipa::path(
    post,
    path = "/api/qr-codes",
    tag = "QR Codes",
    request_body = QrCodeCreateRequest,
    responses(
        (status = 201, description = "QR code created", body = QrCode),
        (status = 401, description = "No valid credentials"),
        (status = 403, description = "Denied"),
        (status = 409, description = "Slug already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    Json(payload): Json<QrCodeCreateRequest>,
) -> AppResult<(StatusCode, Json<QrCode>)> {
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
        return Err(AppError::forbidden("not allowed to create qr codes"));
    }

    ensure_slug_available(&state, "qr_codes", &payload.slug).await?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let group_id = payload.group_id.or(identity.group());

    sqlx::query(
        "INSERT INTO qr_codes (id, slug, target_url, owner_id, created_by, group_id, created_at, updated_at) \
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

    let qr = QrCode {
        id,
        slug: payload.slug,
        target_url: payload.target_url,
        owner_id: Some(identity.user_id),
        group_id,
        created_at: now,
        updated_at: now,
    };

    Ok((StatusCode::CREATED, Json(qr)))
}

#[utoipa::path(
    get,
    path = "/api/qr-codes/{id}",
    tag = "QR Codes",
    params(("id" = Uuid, Path, description = "QR code ID")),
    responses(
        (status = 200, description = "QR code detail", body = QrCode),
        (status = 401, description = "No valid credentials"),
        (status = 403, description = "Denied"),
        (status = 404, description = "Not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_one(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QrCode>> {
    let qr = fetch_qr_code(&state, id).await?;
    authorize(&state, &identity, PermissionType::Read, id).await?;
    Ok(Json(qr))
}

#[utoipa::path(
    put,
    path = "/api/qr-codes/{id}",
    tag = "QR Codes",
    params(("id" = Uuid, Path, description = "QR code ID")),
    request_body = QrCodeUpdateRequest,
    responses(
        (status = 200, description = "QR code updated", body = QrCode),
        (status = 401, description = "No valid credentials"),
        (status = 403, description = "Denied"),
        (status = 404, description = "Not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<QrCodeUpdateRequest>,
) -> AppResult<Json<QrCode>> {
    let existing = fetch_qr_code(&state, id).await?;
    authorize(&state, &identity, PermissionType::Update, id).await?;

    let slug = payload.slug.unwrap_or(existing.slug);
    let target_url = payload.target_url.unwrap_or(existing.target_url);
    let now = Utc::now();

    sqlx::query("UPDATE qr_codes SET slug = ?, target_url = ?, updated_at = ? WHERE id = ?")
        .bind(&slug)
        .bind(&target_url)
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(Json(QrCode {
        slug,
        target_url,
        updated_at: now,
        ..existing
    }))
}

#[utoipa::path(
    delete,
    path = "/api/qr-codes/{id}",
    tag = "QR Codes",
    params(("id" = Uuid, Path, description = "QR code ID")),
    responses(
        (status = 204, description = "QR code deleted"),
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
    fetch_qr_code(&state, id).await?;
    authorize(&state, &identity, PermissionType::Delete, id).await?;

    sqlx::query("UPDATE qr_codes SET deleted_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn authorize(
    state: &AppState,
    identity: &Identity,
    action: PermissionType,
    id: Uuid,
) -> AppResult<()> {
    let decision = state
        .permissions
        .decide_for_resource(
            identity.user_id,
            &identity.role,
            identity.group(),
            RESOURCE,
            action,
            Some(id),
        )
        .await;

    if decision.allowed {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "not allowed to {} this qr code",
            action.as_str()
        )))
    }
}

async fn fetch_qr_code(state: &AppState, id: Uuid) -> AppResult<QrCode> {
    let row = sqlx::query(
        "SELECT id, slug, target_url, owner_id, group_id, created_at, updated_at \
         FROM qr_codes WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("qr code not found"))?;

    Ok(QrCode::from_row(&row))
}

pub(super) async fn ensure_slug_available(state: &AppState, table: &str, slug: &str) -> AppResult<()> {
    let sql = format!("SELECT COUNT(1) FROM {table} WHERE slug = ? AND deleted_at IS NULL");
    let count: i64 = sqlx::query_scalar(&sql).bind(slug).fetch_one(&state.pool).await?;
    if count > 0 {
        return Err(AppError::conflict("slug already in use"));
    }
    Ok(())
}
