use axum::extract::{Query, State};
use axum::Json;
use sqlx::Row;

use crate::app::AppState;
use crate::authz::PermissionType;
use crate::errors::{AppError, AppResult};
use crate::identity::Identity;
use crate::models::permission::{
    EffectivePermissionsResponse, PermissionCheckQuery, PermissionCheckResponse, PermissionRecord,
};

/// Decision endpoint for UI gating: the dashboard asks before rendering an
/// action it might have to hide.
#[utoipa::path(
    get,
    path = "/api/permissions/check",
    tag = "Permissions",
    params(PermissionCheckQuery),
    responses(
        (status = 200, description = "Decision with provenance", body = PermissionCheckResponse),
        (status = 400, description = "Unknown action"),
        (status = 401, description = "No valid credentials"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<PermissionCheckQuery>,
) -> AppResult<Json<PermissionCheckResponse>> {
    let action = PermissionType::parse(&query.action)
        .ok_or_else(|| AppError::bad_request(format!("unknown action: {}", query.action)))?;

    let decision = state
        .permissions
        .decide_for_resource(
            identity.user_id,
            &identity.role,
            identity.group(),
            &query.resource,
            action,
            query.resource_id,
        )
        .await;

    Ok(Json(PermissionCheckResponse {
        allowed: decision.allowed,
        source: decision.source,
    }))
}

/// Diagnostic listing of the permission rows behind the caller's role,
/// matched case-insensitively so historical label casings show up.
#[utoipa::path(
    get,
    path = "/api/permissions/effective",
    tag = "Permissions",
    responses(
        (status = 200, description = "Permission records for the caller's role", body = EffectivePermissionsResponse),
        (status = 401, description = "No valid credentials"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn effective(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<Json<EffectivePermissionsResponse>> {
    let rows = sqlx::query(
        r#"
        SELECT role, resource_type, permission_type, scope, created_at, updated_at
        FROM role_permissions
        WHERE LOWER(role) = LOWER(?)
        ORDER BY resource_type, permission_type
        "#,
    )
    .bind(&identity.role)
    .fetch_all(&state.pool)
    .await?;

    let records: Vec<PermissionRecord> = rows
        .iter()
        .map(|row| PermissionRecord {
            role: row.get("role"),
            resource_type: row.get("resource_type"),
            permission_type: row.get("permission_type"),
            scope: row.get("scope"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
        .collect();

    Ok(Json(EffectivePermissionsResponse {
        role: identity.role,
        records,
    }))
}
