use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Access scope attached to a permission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    None,
    Own,
    Group,
    All,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::None => "none",
            Scope::Own => "own",
            Scope::Group => "group",
            Scope::All => "all",
        }
    }

    /// Parse a stored scope value. Returns `None` for anything unrecognized
    /// so callers can fail closed on corrupted rows.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "none" => Some(Scope::None),
            "own" => Some(Scope::Own),
            "group" => Some(Scope::Group),
            "all" => Some(Scope::All),
            _ => None,
        }
    }
}

/// Action being authorized. `Export` is an alias of `Read` at lookup time;
/// no record should carry a distinct export scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Create,
    Read,
    Update,
    Delete,
    Manage,
    Export,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Create => "create",
            PermissionType::Read => "read",
            PermissionType::Update => "update",
            PermissionType::Delete => "delete",
            PermissionType::Manage => "manage",
            PermissionType::Export => "export",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "create" => Some(PermissionType::Create),
            "read" => Some(PermissionType::Read),
            "update" => Some(PermissionType::Update),
            "delete" => Some(PermissionType::Delete),
            "manage" => Some(PermissionType::Manage),
            "export" => Some(PermissionType::Export),
            _ => None,
        }
    }

    /// The permission type used for record lookup and scope evaluation.
    pub fn for_lookup(&self) -> Self {
        match self {
            PermissionType::Export => PermissionType::Read,
            other => *other,
        }
    }
}

/// A group id of 0 and an absent group id both mean "no group assigned".
pub(crate) fn effective_group(group_id: Option<i64>) -> Option<i64> {
    match group_id {
        Some(0) | None => None,
        other => other,
    }
}

/// Evaluate a resolved scope against the caller and the resource's ownership
/// context. Pure: all datastore lookups (record fetch, owner-group
/// resolution) happen before this point.
///
/// `create` has no existing owner to compare against, so any non-`none`
/// scope permits it. `group` grants when no group context is resolvable on
/// the resource side: absence of context is "cannot prove a mismatch", not a
/// denial (see DESIGN.md for the standing question on this default).
pub fn resolve_scope(
    scope: Scope,
    permission: PermissionType,
    caller_id: Uuid,
    caller_group_id: Option<i64>,
    resource_owner_id: Option<Uuid>,
    resource_group_id: Option<i64>,
) -> bool {
    if permission.for_lookup() == PermissionType::Create {
        return scope != Scope::None;
    }

    match scope {
        Scope::All => true,
        Scope::Group => match effective_group(resource_group_id) {
            Some(resource_group) => effective_group(caller_group_id) == Some(resource_group),
            None => true,
        },
        Scope::Own => resource_owner_id.is_some_and(|owner| owner == caller_id),
        Scope::None => false,
    }
}
