use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use uuid::Uuid;

use crate::app::AppState;

use super::cache::MenuCache;
use super::{MenuNode, MenuProvider};

/// Why a path was denied; carried to the forbidden page as a reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The node exists in the tree and is explicitly locked for the role.
    Locked,
    /// The node is unknown but its top-level ancestor is locked.
    ParentLocked,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Locked => "locked",
            DenyReason::ParentLocked => "parent-locked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny(DenyReason),
}

/// Decides per-path access from the role's menu tree.
///
/// Known nodes follow their lock flag. Unknown paths are allowed unless
/// their first segment matches a locked top-level node: blocking unknown
/// paths outright would break newly added routes before the menu
/// configuration catches up, but a locked section must keep covering the
/// pages under it.
pub struct RouteGuard {
    provider: Arc<dyn MenuProvider>,
    cache: MenuCache,
}

impl RouteGuard {
    pub fn new(provider: Arc<dyn MenuProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: MenuCache::new(ttl),
        }
    }

    /// The caller's menu tree, served from the (user, role) cache when
    /// fresh.
    pub async fn menu_for(&self, user_id: Uuid, role: &str) -> Result<Arc<Vec<MenuNode>>, crate::errors::AppError> {
        if let Some(tree) = self.cache.get(user_id, role) {
            return Ok(tree);
        }
        let tree = Arc::new(self.provider.menu_tree(role).await?);
        self.cache.insert(user_id, role, tree.clone());
        Ok(tree)
    }

    pub async fn evaluate(&self, user_id: Uuid, role: &str, path: &str) -> GuardDecision {
        let tree = match self.menu_for(user_id, role).await {
            Ok(tree) => tree,
            Err(err) => {
                // Navigation data being unavailable must not lock users out
                // of every page; unknown paths already fail open.
                tracing::error!(role, path, error = %err, "menu tree fetch failed; allowing");
                return GuardDecision::Allow;
            }
        };

        let wanted = normalize_path(path);

        if let Some(node) = find_by_path(&tree, &wanted) {
            if node.is_accessible {
                return GuardDecision::Allow;
            }
            tracing::debug!(role, path, "menu node locked");
            return GuardDecision::Deny(DenyReason::Locked);
        }

        if let Some(section) = top_level_segment(&wanted) {
            let locked_parent = tree
                .iter()
                .any(|node| normalize_path(&node.path) == section && !node.is_accessible);
            if locked_parent {
                tracing::debug!(role, path, section = %section, "top-level section locked");
                return GuardDecision::Deny(DenyReason::ParentLocked);
            }
        }

        GuardDecision::Allow
    }

    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

/// Trailing-slash tolerant path comparison form.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.len() > 1 {
        trimmed.trim_end_matches('/').to_string()
    } else {
        trimmed.to_string()
    }
}

/// `/admin/users/7` -> `/admin`
fn top_level_segment(path: &str) -> Option<String> {
    let first = path.trim_start_matches('/').split('/').next()?;
    if first.is_empty() {
        return None;
    }
    Some(format!("/{first}"))
}

fn find_by_path<'a>(nodes: &'a [MenuNode], wanted: &str) -> Option<&'a MenuNode> {
    for node in nodes {
        if normalize_path(&node.path) == wanted {
            return Some(node);
        }
        if let Some(found) = find_by_path(&node.children, wanted) {
            return Some(found);
        }
    }
    None
}

/// Paths the guard never applies to: the API surface (which enforces
/// permissions per handler), docs, and the guard's own redirect targets.
fn is_exempt(path: &str) -> bool {
    path == "/"
        || path.starts_with("/api/")
        || path.starts_with("/api-docs")
        || path.starts_with("/docs")
        || path.starts_with("/login")
        || path.starts_with("/forbidden")
        || path == "/favicon.ico"
}

/// Route-guard middleware for page paths. Unauthenticated callers go to the
/// login page; denied callers go to the forbidden page with the original
/// path and a reason code.
pub async fn menu_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if is_exempt(&path) {
        return next.run(request).await;
    }

    let Some(identity) = state.identity.resolve(request.headers()).await else {
        return Redirect::temporary(&format!("/login?from={path}")).into_response();
    };

    match state.guard.evaluate(identity.user_id, &identity.role, &path).await {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Deny(reason) => {
            tracing::warn!(
                user_id = %identity.user_id,
                role = %identity.role,
                path = %path,
                reason = reason.as_str(),
                "route denied"
            );
            Redirect::temporary(&format!("/forbidden?from={path}&reason={}", reason.as_str()))
                .into_response()
        }
    }
}
