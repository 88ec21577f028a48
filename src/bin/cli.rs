use sqlx::Row;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "qrdash ops tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Insert baseline roles, users, permission records and the menu tree.
    /// The permission engine fails safe when these rows are missing; this
    /// is how operators put them in place.
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::Seed => {
            let pool = get_pool().await?;
            seed(&pool).await?;
            println!("Seed data in place");
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    // sqlx reads the version from the digits before the first underscore,
    // so the timestamp must stay one unbroken number.
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'",
    )
    .fetch_optional(pool)
    .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let version = migration.version;
        let applied = applied_versions.contains(&version);
        let status = if applied { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if !desc.is_empty() { desc } else { "unknown" };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Try local ./migrations first (when running from repo root). If that
    // doesn't exist (common in containers where CWD differs), fall back to
    // the crate-local migrations folder determined by CARGO_MANIFEST_DIR.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}

// =============================================================================
// SEED
// =============================================================================

async fn seed(pool: &SqlitePool) -> anyhow::Result<()> {
    let admin_role = upsert_role(pool, "admin", Some("Full access")).await?;
    let editor_role = upsert_role(pool, "editor", Some("Manages links for their group")).await?;
    let viewer_role = upsert_role(pool, "viewer", Some("Read-only dashboards")).await?;

    upsert_user(pool, "Admin", "admin@qrdash.local", &admin_role, None).await?;
    upsert_user(pool, "Editor", "editor@qrdash.local", &editor_role, Some(1)).await?;
    upsert_user(pool, "Viewer", "viewer@qrdash.local", &viewer_role, Some(1)).await?;

    let permission_rows: &[(&str, &str, &str, &str)] = &[
        ("admin", "qr_code", "create", "all"),
        ("admin", "qr_code", "read", "all"),
        ("admin", "qr_code", "update", "all"),
        ("admin", "qr_code", "delete", "all"),
        ("admin", "qr_code", "manage", "all"),
        ("admin", "short_url", "create", "all"),
        ("admin", "short_url", "read", "all"),
        ("admin", "short_url", "update", "all"),
        ("admin", "short_url", "delete", "all"),
        ("admin", "short_url", "manage", "all"),
        ("admin", "users", "read", "all"),
        ("admin", "users", "update", "all"),
        ("admin", "users", "manage", "all"),
        ("editor", "qr_code", "create", "group"),
        ("editor", "qr_code", "read", "group"),
        ("editor", "qr_code", "update", "own"),
        ("editor", "qr_code", "delete", "own"),
        ("editor", "short_url", "create", "group"),
        ("editor", "short_url", "read", "group"),
        ("editor", "short_url", "update", "own"),
        ("editor", "short_url", "delete", "own"),
        ("viewer", "qr_code", "read", "group"),
        ("viewer", "short_url", "read", "group"),
        ("viewer", "qr_analytics", "read", "all"),
        ("viewer", "url_analytics", "read", "all"),
    ];

    let now = Utc::now();
    for (role, resource, permission, scope) in permission_rows {
        sqlx::query(
            "INSERT OR IGNORE INTO role_permissions (role, resource_type, permission_type, scope, created_at, updated_at) \
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
    }

    let dashboard = upsert_menu_item(pool, "Dashboard", "/dashboard", None, 0).await?;
    upsert_menu_item(pool, "QR Codes", "/dashboard/qr-codes", Some(dashboard), 1).await?;
    upsert_menu_item(pool, "Short URLs", "/dashboard/short-urls", Some(dashboard), 2).await?;
    upsert_menu_item(pool, "Analytics", "/analytics", None, 1).await?;
    let admin_menu = upsert_menu_item(pool, "Administration", "/admin", None, 2).await?;
    upsert_menu_item(pool, "Users", "/admin/users", Some(admin_menu), 1).await?;
    upsert_menu_item(pool, "Permissions", "/admin/permissions", Some(admin_menu), 2).await?;
    let settings = upsert_menu_item(pool, "Settings", "/settings", None, 3).await?;

    for (menu_id, role) in [(admin_menu, "editor"), (admin_menu, "viewer"), (settings, "viewer")] {
        sqlx::query(
            "INSERT OR REPLACE INTO menu_role_access (menu_id, role, is_accessible) VALUES (?, ?, 0)",
        )
        .bind(menu_id)
        .bind(role)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn upsert_role(pool: &SqlitePool, name: &str, description: Option<&str>) -> anyhow::Result<String> {
    let now = Utc::now();
    sqlx::query(
        "INSERT OR IGNORE INTO roles (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let id: String = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

async fn upsert_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    role_id: &str,
    group_id: Option<i64>,
) -> anyhow::Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT OR IGNORE INTO users (id, name, email, role_id, group_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(email)
    .bind(role_id)
    .bind(group_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_menu_item(
    pool: &SqlitePool,
    label: &str,
    path: &str,
    parent_id: Option<i64>,
    position: i64,
) -> anyhow::Result<i64> {
    sqlx::query(
        "INSERT OR IGNORE INTO menu_items (label, path, parent_id, position) VALUES (?, ?, ?, ?)",
    )
    .bind(label)
    .bind(path)
    .bind(parent_id)
    .bind(position)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM menu_items WHERE path = ?")
        .bind(path)
        .fetch_one(pool)
        .await?;
    Ok(id)
}
