use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::middleware;
use axum::routing::{delete, get};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{PermissionService, SqliteOwnershipResolver, SqlitePermissionStore};
use crate::errors::AppError;
use crate::identity::IdentityExtractor;
use crate::jwt::JwtConfig;
use crate::menu::{menu_guard, RouteGuard, SqliteMenuProvider, DEFAULT_MENU_TTL};
use crate::routes::{health, menus, pages, permissions, qr_codes, short_urls};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub identity: Arc<IdentityExtractor>,
    pub permissions: Arc<PermissionService>,
    pub guard: Arc<RouteGuard>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, menu_ttl: Duration) -> Self {
        let jwt = Arc::new(jwt);
        let identity = Arc::new(IdentityExtractor::with_defaults(pool.clone(), jwt.clone()));
        let permissions = Arc::new(PermissionService::new(
            Arc::new(SqlitePermissionStore::new(pool.clone())),
            Arc::new(SqliteOwnershipResolver::new(pool.clone())),
        ));
        let guard = Arc::new(RouteGuard::new(
            Arc::new(SqliteMenuProvider::new(pool.clone())),
            menu_ttl,
        ));

        Self {
            pool,
            jwt,
            identity,
            permissions,
            guard,
        }
    }
}

fn menu_ttl_from_env() -> Duration {
    std::env::var("MENU_CACHE_TTL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_MENU_TTL)
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let state = AppState::new(pool, jwt_config, menu_ttl_from_env());

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(health::health))
        .route("/menus", get(menus::menu_tree))
        .route("/permissions/check", get(permissions::check))
        .route("/permissions/effective", get(permissions::effective))
        .route("/qr-codes", get(qr_codes::list).post(qr_codes::create))
        .route(
            "/qr-codes/:id",
            get(qr_codes::get_one).put(qr_codes::update).delete(qr_codes::remove),
        )
        .route("/short-urls", get(short_urls::list).post(short_urls::create))
        .route("/short-urls/:id", delete(short_urls::remove));

    let router = Router::new()
        .nest("/api", api_routes)
        .route("/forbidden", get(pages::forbidden))
        .route("/login", get(pages::login))
        // Page paths are not served here; the fallback keeps them flowing
        // through the route guard so locked sections redirect before 404.
        .fallback(pages::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), menu_guard))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
