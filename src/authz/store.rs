use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::errors::AppError;

use super::scope::PermissionType;

/// Read-only lookup into the permission record table.
///
/// The store does exact-match on all three columns; role-casing and
/// resource-alias fallbacks are the resolver's job. The scope comes back as
/// the raw stored string so the resolver can fail closed on corrupted rows
/// instead of the store guessing.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn find_scope(
        &self,
        role: &str,
        resource_type: &str,
        permission_type: PermissionType,
    ) -> Result<Option<String>, AppError>;
}

#[derive(Debug, Clone)]
pub struct SqlitePermissionStore {
    pool: SqlitePool,
}

impl SqlitePermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
    async fn find_scope(
        &self,
        role: &str,
        resource_type: &str,
        permission_type: PermissionType,
    ) -> Result<Option<String>, AppError> {
        let scope: Option<String> = sqlx::query_scalar(
            "SELECT scope FROM role_permissions WHERE role = ? AND resource_type = ? AND permission_type = ? LIMIT 1",
        )
        .bind(role)
        .bind(resource_type)
        .bind(permission_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(scope)
    }
}
