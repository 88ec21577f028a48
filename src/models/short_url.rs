use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShortUrl {
    pub id: Uuid,
    pub slug: String,
    pub target_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShortUrl {
    pub fn from_row(row: &SqliteRow) -> Self {
        let owner: Option<String> = row.get("owner_id");
        ShortUrl {
            id: Uuid::parse_str(row.get::<&str, _>("id")).unwrap_or_default(),
            slug: row.get("slug"),
            target_url: row.get("target_url"),
            owner_id: owner.and_then(|raw| Uuid::parse_str(&raw).ok()),
            group_id: row.get("group_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShortUrlCreateRequest {
    #[schema(example = "promo24")]
    pub slug: String,
    #[schema(example = "https://example.com/promo")]
    pub target_url: String,
    pub group_id: Option<i64>,
}
