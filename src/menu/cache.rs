use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::MenuNode;

pub const DEFAULT_MENU_TTL: Duration = Duration::from_secs(30);

/// Process-local menu-tree cache keyed by (user, role) with a fixed TTL.
///
/// Entries are idempotently derivable from the same inputs, so expiry is
/// last-writer-wins; a coarse mutex is plenty at one entry per active user.
/// The TTL is injected by the owner (env-tunable) rather than read from a
/// global.
pub struct MenuCache {
    ttl: Duration,
    entries: Mutex<HashMap<(Uuid, String), Entry>>,
}

struct Entry {
    inserted_at: Instant,
    tree: Arc<Vec<MenuNode>>,
}

impl MenuCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, user_id: Uuid, role: &str) -> Option<Arc<Vec<MenuNode>>> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&(user_id, role.to_string()))?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.tree.clone())
    }

    pub fn insert(&self, user_id: Uuid, role: &str, tree: Arc<Vec<MenuNode>>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            (user_id, role.to_string()),
            Entry {
                inserted_at: Instant::now(),
                tree,
            },
        );
    }

    /// Drop everything; menu edits take effect on the next fetch.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
