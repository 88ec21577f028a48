//! Authorization module - permission-scope resolution engine
//!
//! This module decides, for a (user, role, resource, action) tuple, whether
//! access is granted under a scope model (none/own/group/all) layered on
//! role-based permission records:
//! - Role and resource-name normalization for historical label drift
//! - Exact-match record lookup with a documented variant fallback list
//! - Pure scope evaluation against caller identity and resource ownership
//! - A fail-safe policy table for missing records and store failures
//!
//! Every decision carries its source so callers can log and audit which
//! branch produced it.

mod ownership;
mod policy;
mod resource;
mod role;
mod scope;
mod service;
mod store;

pub use ownership::{OwnershipResolver, ResourceOwner, SqliteOwnershipResolver};
pub use policy::{fallback_decision, is_analytics_resource, Decision, DecisionSource, FallbackReason};
pub use resource::canonicalize_resource;
pub use role::normalize_role;
pub use scope::{resolve_scope, PermissionType, Scope};
pub use service::PermissionService;
pub use store::{PermissionStore, SqlitePermissionStore};

/// Canonical role names
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const EDITOR: &str = "editor";
    pub const VIEWER: &str = "viewer";
    pub const USER: &str = "user";
}

/// Canonical resource names
pub mod resources {
    pub const QR_CODE: &str = "qr_code";
    pub const SHORT_URL: &str = "short_url";
    pub const USERS: &str = "users";
    pub const QR_ANALYTICS: &str = "qr_analytics";
    pub const URL_ANALYTICS: &str = "url_analytics";
}
