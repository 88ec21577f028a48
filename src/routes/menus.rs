use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::identity::Identity;
use crate::menu::MenuNode;

/// The caller's navigation tree, with per-node accessibility for their
/// role. Served from the guard's cache so page loads and route checks see
/// the same snapshot.
#[utoipa::path(
    get,
    path = "/api/menus",
    tag = "Menus",
    responses(
        (status = 200, description = "Menu tree for the caller's role", body = Vec<MenuNode>),
        (status = 401, description = "No valid credentials"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn menu_tree(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<Json<Vec<MenuNode>>> {
    let tree = state.guard.menu_for(identity.user_id, &identity.role).await?;
    Ok(Json(tree.as_ref().clone()))
}
