use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;
use uuid::Uuid;

use qrdash::create_app;
use qrdash::jwt::JwtConfig;

async fn setup(db_name: &str) -> Result<(tempfile::TempDir, SqlitePool, Router)> {
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

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;
    Ok((dir, pool, app))
}

async fn insert_user_with_role(pool: &SqlitePool, email: &str, role_name: &str) -> Result<Uuid> {
    let now = Utc::now();
    let role_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT OR IGNORE INTO roles (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(&role_id)
        .bind(role_name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    let role_id: String = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
        .bind(role_name)
        .fetch_one(pool)
        .await?;

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, name, email, role_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(email)
    .bind(email)
    .bind(&role_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn effective_role(app: &Router, auth_header: Option<&str>, cookie: Option<&str>) -> Result<(StatusCode, Option<String>)> {
    let mut builder = Request::builder().method("GET").uri("/api/permissions/effective");
    if let Some(value) = auth_header {
        builder = builder.header("authorization", value);
    }
    if let Some(value) = cookie {
        builder = builder.header("cookie", value);
    }
    let resp = app.clone().oneshot(builder.body(Body::empty())?).await?;
    let status = resp.status();
    if status != StatusCode::OK {
        return Ok((status, None));
    }
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    Ok((status, body["role"].as_str().map(String::from)))
}

#[tokio::test]
async fn credential_sources_resolve_in_priority_order() -> Result<()> {
    let (_dir, pool, app) = setup("identity.db").await?;
    let jwt = JwtConfig::from_env()?;

    let session_user = insert_user_with_role(&pool, "session@example.com", "Administrator").await?;
    let bearer_user = insert_user_with_role(&pool, "bearer@example.com", "editor").await?;
    let cookie_user = insert_user_with_role(&pool, "cookie@example.com", "viewer").await?;

    let session_token = jwt.encode(session_user)?;

    // 1. Session JWT as bearer; role name normalized on the way out
    let (status, role) = effective_role(&app, Some(&format!("Bearer {session_token}")), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role.as_deref(), Some("admin"));

    // 2. Session JWT via cookie
    let (status, role) =
        effective_role(&app, None, Some(&format!("session_token={session_token}"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role.as_deref(), Some("admin"));

    // 3. Bearer carrying a raw user reference
    let (status, role) = effective_role(&app, Some(&format!("Bearer {bearer_user}")), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role.as_deref(), Some("editor"));

    // 4. Legacy uid cookie
    let (status, role) = effective_role(&app, None, Some(&format!("uid={cookie_user}"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role.as_deref(), Some("viewer"));

    // 5. Session token outranks the legacy cookie when both are present
    let (status, role) = effective_role(
        &app,
        Some(&format!("Bearer {session_token}")),
        Some(&format!("uid={cookie_user}")),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role.as_deref(), Some("admin"));

    // 6. Garbage everywhere -> 401
    let (status, _) = effective_role(&app, Some("Bearer not-a-credential"), Some("uid=junk")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 7. Valid token shape for a user that does not exist -> 401
    let ghost = jwt.encode(Uuid::new_v4())?;
    let (status, _) = effective_role(&app, Some(&format!("Bearer {ghost}")), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}
