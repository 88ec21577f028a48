//! Menu visibility and the route guard built on it.
//!
//! The navigation tree is administrator-managed data; each node carries a
//! per-role accessibility flag. The route guard flattens the caller's tree
//! to decide whether a page path may be entered, with a short-TTL cache per
//! (user, role) in front of the store.

mod cache;
mod guard;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use utoipa::ToSchema;

use crate::errors::AppError;

pub use cache::{MenuCache, DEFAULT_MENU_TTL};
pub use guard::{menu_guard, DenyReason, GuardDecision, RouteGuard};

/// One navigation node as served to the dashboard and consumed by the
/// route guard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MenuNode {
    pub id: i64,
    pub label: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub is_accessible: bool,
    pub children: Vec<MenuNode>,
}

/// Source of a role's menu tree. Pure read; the CRUD side lives in the
/// admin UI, not here.
#[async_trait]
pub trait MenuProvider: Send + Sync {
    async fn menu_tree(&self, role: &str) -> Result<Vec<MenuNode>, AppError>;
}

#[derive(Debug, Clone)]
pub struct SqliteMenuProvider {
    pool: SqlitePool,
}

impl SqliteMenuProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MenuProvider for SqliteMenuProvider {
    async fn menu_tree(&self, role: &str) -> Result<Vec<MenuNode>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.label, m.path, m.parent_id,
                   COALESCE(a.is_accessible, 1) AS is_accessible
            FROM menu_items m
            LEFT JOIN menu_role_access a ON a.menu_id = m.id AND a.role = ?
            ORDER BY m.position, m.id
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        let flat: Vec<MenuNode> = rows
            .iter()
            .map(|row| MenuNode {
                id: row.get("id"),
                label: row.get("label"),
                path: row.get("path"),
                parent_id: row.get("parent_id"),
                is_accessible: row.get::<i64, _>("is_accessible") != 0,
                children: Vec::new(),
            })
            .collect();

        Ok(build_tree(flat))
    }
}

/// Assemble parent/child links from the flat row set, keeping row order.
/// Nodes pointing at a missing parent surface as roots rather than being
/// dropped.
fn build_tree(flat: Vec<MenuNode>) -> Vec<MenuNode> {
    use std::collections::HashMap;

    let ids: Vec<i64> = flat.iter().map(|node| node.id).collect();
    let mut by_id: HashMap<i64, MenuNode> = flat.into_iter().map(|node| (node.id, node)).collect();

    let mut roots: Vec<MenuNode> = Vec::new();
    for id in ids {
        let Some(node) = by_id.remove(&id) else { continue };
        match node.parent_id {
            Some(parent_id) if by_id.contains_key(&parent_id) => {
                if let Some(parent) = by_id.get_mut(&parent_id) {
                    parent.children.push(node);
                }
            }
            Some(parent_id) => {
                // Parent already moved into the output (ordering guarantees
                // parents sort before children only when positions are
                // maintained); find it among the roots.
                if let Some(parent) = find_mut(&mut roots, parent_id) {
                    parent.children.push(node);
                } else {
                    roots.push(node);
                }
            }
            None => roots.push(node),
        }
    }

    roots
}

fn find_mut(nodes: &mut [MenuNode], id: i64) -> Option<&mut MenuNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}
