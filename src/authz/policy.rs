use serde::Serialize;
use utoipa::ToSchema;

use super::scope::{PermissionType, Scope};
use super::roles;

/// Why the record lookup produced no usable scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No row exists for any tried (role, resource, action) variant.
    MissingRecord,
    /// The store itself failed; the row may or may not exist.
    StoreError,
}

/// Which branch of the engine produced a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionSource {
    /// A permission record matched; carries the resolved scope and the role
    /// variant that hit, for audit.
    Record { scope: Scope, role_variant: String },
    /// No record, but the role normalizes into the admin family.
    ImplicitAdmin,
    /// Read on an analytics-family resource with no usable record; granted
    /// so dashboards survive missing seed data and transient store issues.
    AnalyticsRead,
    /// No record and no applicable soft-allow.
    MissingRecord,
    /// The store failed and no applicable soft-allow.
    StoreError,
    /// The record's scope column holds an unrecognized value.
    UnknownScope { raw: String },
}

/// Outcome of a permission check, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Decision {
    pub allowed: bool,
    pub source: DecisionSource,
}

impl Decision {
    pub fn allow(source: DecisionSource) -> Self {
        Self { allowed: true, source }
    }

    pub fn deny(source: DecisionSource) -> Self {
        Self { allowed: false, source }
    }
}

/// Whether a resource name belongs to the analytics family. Checked against
/// the raw request name as well as the canonical one, because an analytics
/// alias may canonicalize onto a non-analytics resource (`user_analytics`
/// folds into `users`).
pub fn is_analytics_resource(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    name == "analytics" || name.ends_with("_analytics")
}

/// The fail-safe matrix, kept in one place so it is auditable as data:
///
/// | reason        | condition                      | outcome        |
/// |---------------|--------------------------------|----------------|
/// | MissingRecord | role family is admin           | allow          |
/// | MissingRecord | analytics resource, read       | allow          |
/// | MissingRecord | otherwise                      | deny           |
/// | StoreError    | analytics resource, read       | allow          |
/// | StoreError    | otherwise (admins included)    | deny           |
///
/// Admins are not implicitly allowed on store failure: a broken store must
/// not widen access for anyone beyond the analytics-read carve-out.
pub fn fallback_decision(
    reason: FallbackReason,
    canonical_role: &str,
    raw_resource: &str,
    canonical_resource: &str,
    permission: PermissionType,
) -> Decision {
    let analytics_read = permission.for_lookup() == PermissionType::Read
        && (is_analytics_resource(raw_resource) || is_analytics_resource(canonical_resource));

    match reason {
        FallbackReason::MissingRecord => {
            if canonical_role == roles::ADMIN {
                Decision::allow(DecisionSource::ImplicitAdmin)
            } else if analytics_read {
                Decision::allow(DecisionSource::AnalyticsRead)
            } else {
                Decision::deny(DecisionSource::MissingRecord)
            }
        }
        FallbackReason::StoreError => {
            if analytics_read {
                Decision::allow(DecisionSource::AnalyticsRead)
            } else {
                Decision::deny(DecisionSource::StoreError)
            }
        }
    }
}
