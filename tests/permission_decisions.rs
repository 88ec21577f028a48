use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use uuid::Uuid;

use qrdash::authz::{
    DecisionSource, PermissionService, PermissionType, Scope, SqliteOwnershipResolver,
    SqlitePermissionStore,
};

async fn test_pool(db_name: &str) -> Result<(tempfile::TempDir, SqlitePool)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join(db_name);
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

fn service(pool: &SqlitePool) -> PermissionService {
    PermissionService::new(
        Arc::new(SqlitePermissionStore::new(pool.clone())),
        Arc::new(SqliteOwnershipResolver::new(pool.clone())),
    )
}

async fn insert_permission(
    pool: &SqlitePool,
    role: &str,
    resource: &str,
    permission: &str,
    scope: &str,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO role_permissions (role, resource_type, permission_type, scope, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(role)
    .bind(resource)
    .bind(permission)
    .bind(scope)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_user(pool: &SqlitePool, email: &str, group_id: Option<i64>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, name, email, group_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(email)
    .bind(email)
    .bind(group_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn insert_short_url(pool: &SqlitePool, owner: Uuid, group_id: Option<i64>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO short_urls (id, slug, target_url, owner_id, created_by, group_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(format!("slug-{id}"))
    .bind("https://example.com")
    .bind(owner.to_string())
    .bind(owner.to_string())
    .bind(group_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

#[tokio::test]
async fn admin_any_casing_implicitly_allowed_without_records() -> Result<()> {
    let (_dir, pool) = test_pool("decisions_admin.db").await?;
    let svc = service(&pool);

    // No permission records exist at all.
    let decision = svc
        .decide(
            Uuid::new_v4(),
            "Administrator",
            None,
            "qr_codes",
            PermissionType::Delete,
            None,
            None,
        )
        .await;

    assert!(decision.allowed);
    assert_eq!(decision.source, DecisionSource::ImplicitAdmin);
    Ok(())
}

#[tokio::test]
async fn viewer_own_scope_denies_foreign_resource() -> Result<()> {
    let (_dir, pool) = test_pool("decisions_own.db").await?;
    insert_permission(&pool, "viewer", "short_url", "update", "own").await?;

    let caller = insert_user(&pool, "u7@example.com", None).await?;
    let owner = insert_user(&pool, "u9@example.com", None).await?;
    let resource = insert_short_url(&pool, owner, None).await?;

    let svc = service(&pool);
    let decision = svc
        .decide_for_resource(
            caller,
            "viewer",
            None,
            "short_url",
            PermissionType::Update,
            Some(resource),
        )
        .await;

    assert!(!decision.allowed);
    assert!(matches!(
        decision.source,
        DecisionSource::Record { scope: Scope::Own, .. }
    ));

    // The owner themselves gets through.
    let owner_decision = svc
        .decide_for_resource(
            owner,
            "viewer",
            None,
            "short_url",
            PermissionType::Update,
            Some(resource),
        )
        .await;
    assert!(owner_decision.allowed);
    Ok(())
}

#[tokio::test]
async fn analytics_read_soft_allowed_without_records() -> Result<()> {
    let (_dir, pool) = test_pool("decisions_analytics.db").await?;
    let svc = service(&pool);

    let decision = svc
        .decide(
            Uuid::new_v4(),
            "editor",
            None,
            "qr_analytics",
            PermissionType::Read,
            None,
            None,
        )
        .await;

    assert!(decision.allowed);
    assert_eq!(decision.source, DecisionSource::AnalyticsRead);

    // The soft-allow is scoped to reads; a write still falls through to deny.
    let write = svc
        .decide(
            Uuid::new_v4(),
            "editor",
            None,
            "qr_analytics",
            PermissionType::Update,
            None,
            None,
        )
        .await;
    assert!(!write.allowed);
    assert_eq!(write.source, DecisionSource::MissingRecord);
    Ok(())
}

#[tokio::test]
async fn group_scope_compares_owner_groups_via_resource() -> Result<()> {
    let (_dir, pool) = test_pool("decisions_group.db").await?;
    insert_permission(&pool, "editor", "qr_code", "update", "group").await?;

    let caller = insert_user(&pool, "caller@example.com", Some(4)).await?;
    let teammate = insert_user(&pool, "teammate@example.com", Some(4)).await?;
    let outsider = insert_user(&pool, "outsider@example.com", Some(5)).await?;

    let now = Utc::now();
    let mut ids = Vec::new();
    for (owner, group) in [(teammate, Some(4)), (outsider, Some(5))] {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO qr_codes (id, slug, target_url, owner_id, created_by, group_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(format!("qr-{id}"))
        .bind("https://example.com")
        .bind(owner.to_string())
        .bind(owner.to_string())
        .bind(group)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await?;
        ids.push(id);
    }

    let svc = service(&pool);

    let same_group = svc
        .decide_for_resource(caller, "editor", Some(4), "qr_code", PermissionType::Update, Some(ids[0]))
        .await;
    assert!(same_group.allowed);

    let cross_group = svc
        .decide_for_resource(caller, "editor", Some(4), "qr_code", PermissionType::Update, Some(ids[1]))
        .await;
    assert!(!cross_group.allowed);
    Ok(())
}

#[tokio::test]
async fn missing_resource_denies_under_own_scope() -> Result<()> {
    let (_dir, pool) = test_pool("decisions_missing.db").await?;
    insert_permission(&pool, "editor", "qr_code", "delete", "own").await?;

    let caller = insert_user(&pool, "someone@example.com", None).await?;
    let svc = service(&pool);

    let decision = svc
        .decide_for_resource(
            caller,
            "editor",
            None,
            "qr_code",
            PermissionType::Delete,
            Some(Uuid::new_v4()),
        )
        .await;

    assert!(!decision.allowed);
    Ok(())
}
