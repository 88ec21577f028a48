use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::resources;
use super::scope::effective_group;

/// A resource's owning user and the group context usable for `group` scope.
/// `owner_group_id` is the resource's own group when it carries one,
/// otherwise the owner's group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceOwner {
    pub owner_id: Option<Uuid>,
    pub owner_group_id: Option<i64>,
}

/// Resolves who owns a resource. Absence is a valid outcome, never an
/// error: a missing resource, a missing owner, or a failing store all come
/// back as `None` and read as "cannot determine ownership" downstream.
#[async_trait]
pub trait OwnershipResolver: Send + Sync {
    async fn resource_owner(&self, resource_type: &str, resource_id: Uuid) -> Option<ResourceOwner>;
}

#[derive(Debug, Clone)]
pub struct SqliteOwnershipResolver {
    pool: SqlitePool,
}

impl SqliteOwnershipResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn table_for(resource_type: &str) -> Option<&'static str> {
        match resource_type {
            resources::QR_CODE => Some("qr_codes"),
            resources::SHORT_URL => Some("short_urls"),
            resources::USERS => Some("users"),
            _ => None,
        }
    }

    async fn owner_group(&self, owner_id: Uuid) -> Option<i64> {
        let result = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT group_id FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(owner_id.to_string())
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(group) => effective_group(group.flatten()),
            Err(err) => {
                tracing::error!(owner_id = %owner_id, error = %err, "owner group lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl OwnershipResolver for SqliteOwnershipResolver {
    async fn resource_owner(&self, resource_type: &str, resource_id: Uuid) -> Option<ResourceOwner> {
        let Some(table) = Self::table_for(resource_type) else {
            tracing::debug!(resource_type, "no ownership table for resource type");
            return None;
        };

        // The target user is their own owner.
        if table == "users" {
            return Some(ResourceOwner {
                owner_id: Some(resource_id),
                owner_group_id: self.owner_group(resource_id).await,
            });
        }

        let sql = format!(
            "SELECT owner_id, created_by, group_id FROM {table} WHERE id = ? AND deleted_at IS NULL",
        );
        let row = match sqlx::query(&sql)
            .bind(resource_id.to_string())
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row?,
            Err(err) => {
                tracing::error!(
                    resource_type,
                    resource_id = %resource_id,
                    error = %err,
                    "ownership lookup failed"
                );
                return None;
            }
        };

        let owner_id: Option<String> = row.get("owner_id");
        let created_by: Option<String> = row.get("created_by");
        let resource_group: Option<i64> = row.get("group_id");

        // Primary owner reference, falling back to the creating user.
        let owner_id = owner_id
            .or(created_by)
            .and_then(|raw| Uuid::parse_str(&raw).ok());

        let owner_group_id = match effective_group(resource_group) {
            Some(group) => Some(group),
            None => match owner_id {
                Some(owner) => self.owner_group(owner).await,
                None => None,
            },
        };

        Some(ResourceOwner {
            owner_id,
            owner_group_id,
        })
    }
}
