use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
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

async fn insert_role(pool: &SqlitePool, name: &str) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query("INSERT INTO roles (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(id)
}

async fn insert_user(
    pool: &SqlitePool,
    email: &str,
    role_id: &str,
    group_id: Option<i64>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, name, email, role_id, group_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(email)
    .bind(email)
    .bind(role_id)
    .bind(group_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
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

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

async fn body_json(resp: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn api_permission_enforcement() -> Result<()> {
    let (_dir, pool, app) = setup("api_enforcement.db").await?;
    let jwt = JwtConfig::from_env()?;

    let admin_role = insert_role(&pool, "Administrator").await?;
    let editor_role = insert_role(&pool, "editor").await?;
    let viewer_role = insert_role(&pool, "viewer").await?;

    let admin = insert_user(&pool, "admin@example.com", &admin_role, None).await?;
    let editor = insert_user(&pool, "editor@example.com", &editor_role, Some(1)).await?;
    let viewer = insert_user(&pool, "viewer@example.com", &viewer_role, Some(1)).await?;

    insert_permission(&pool, "editor", "qr_code", "create", "group").await?;
    insert_permission(&pool, "editor", "qr_code", "read", "group").await?;
    insert_permission(&pool, "editor", "qr_code", "update", "own").await?;
    insert_permission(&pool, "viewer", "qr_code", "read", "own").await?;

    let admin_token = jwt.encode(admin)?;
    let editor_token = jwt.encode(editor)?;
    let viewer_token = jwt.encode(viewer)?;

    // 1. No credentials -> 401, not a guest fallback
    let req = Request::builder()
        .method("GET")
        .uri("/api/qr-codes")
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 2. Editor creates a QR code
    let create_body = json!({
        "slug": "launch",
        "target_url": "https://example.com/launch"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/api/qr-codes")
        .header("content-type", "application/json")
        .header("authorization", bearer(&editor_token))
        .body(Body::from(create_body.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await?;
    let qr_id = created["id"].as_str().context("missing id")?.to_string();

    // 3. Duplicate slug -> 409
    let req = Request::builder()
        .method("POST")
        .uri("/api/qr-codes")
        .header("content-type", "application/json")
        .header("authorization", bearer(&editor_token))
        .body(Body::from(json!({"slug": "launch", "target_url": "https://example.com"}).to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // 4. Owner updates their own QR code (own scope)
    let req = Request::builder()
        .method("PUT")
        .uri(format!("/api/qr-codes/{qr_id}"))
        .header("content-type", "application/json")
        .header("authorization", bearer(&editor_token))
        .body(Body::from(json!({"target_url": "https://example.com/v2"}).to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // 5. Viewer has no update record at all -> 403
    let req = Request::builder()
        .method("PUT")
        .uri(format!("/api/qr-codes/{qr_id}"))
        .header("content-type", "application/json")
        .header("authorization", bearer(&viewer_token))
        .body(Body::from(json!({"target_url": "https://evil.example"}).to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // 6. Viewer reads someone else's QR code under own scope -> 403
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/qr-codes/{qr_id}"))
        .header("authorization", bearer(&viewer_token))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // 7. Viewer listing is scope-filtered to their own rows, not forbidden
    let req = Request::builder()
        .method("GET")
        .uri("/api/qr-codes")
        .header("authorization", bearer(&viewer_token))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let listed = body_json(resp).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    // 8. Admin deletes with no admin records anywhere (implicit allow)
    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/api/qr-codes/{qr_id}"))
        .header("authorization", bearer(&admin_token))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // 9. Deleted rows are gone
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/qr-codes/{qr_id}"))
        .header("authorization", bearer(&admin_token))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn permission_check_endpoint_reports_provenance() -> Result<()> {
    let (_dir, pool, app) = setup("api_check.db").await?;
    let jwt = JwtConfig::from_env()?;

    let editor_role = insert_role(&pool, "editor").await?;
    let editor = insert_user(&pool, "editor@example.com", &editor_role, None).await?;
    insert_permission(&pool, "editor", "qr_code", "update", "own").await?;
    let token = jwt.encode(editor)?;

    // Analytics read soft-allow, distinct from a record match
    let req = Request::builder()
        .method("GET")
        .uri("/api/permissions/check?resource=qr_analytics&action=read")
        .header("authorization", bearer(&token))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["allowed"], json!(true));
    assert_eq!(body["source"]["kind"], json!("analytics_read"));

    // export resolves through the read lookup; no update row is consulted
    let req = Request::builder()
        .method("GET")
        .uri("/api/permissions/check?resource=qr_code&action=export")
        .header("authorization", bearer(&token))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    let body = body_json(resp).await?;
    assert_eq!(body["allowed"], json!(false));
    assert_eq!(body["source"]["kind"], json!("missing_record"));

    // Unknown action -> 400
    let req = Request::builder()
        .method("GET")
        .uri("/api/permissions/check?resource=qr_code&action=frobnicate")
        .header("authorization", bearer(&token))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Effective listing surfaces the stored rows
    let req = Request::builder()
        .method("GET")
        .uri("/api/permissions/effective")
        .header("authorization", bearer(&token))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["records"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["records"][0]["scope"], json!("own"));

    Ok(())
}
