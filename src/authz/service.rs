use std::sync::Arc;

use uuid::Uuid;

use super::ownership::OwnershipResolver;
use super::policy::{fallback_decision, Decision, DecisionSource, FallbackReason};
use super::resource::canonicalize_resource;
use super::resources;
use super::scope::{effective_group, resolve_scope, PermissionType, Scope};
use super::store::PermissionStore;

/// One record-lookup attempt across the variant fallback lists.
enum Lookup {
    Found {
        role_variant: String,
        resource_name: String,
        raw_scope: String,
    },
    Missing,
    Failed,
}

/// Orchestrates a permission decision: normalize inputs, look up the record
/// with the variant fallback list, apply the fail-safe policy when no
/// usable record exists, and evaluate the resolved scope.
///
/// Decision flow for one check:
/// identity -> role normalized -> resource canonicalized -> record lookup
/// (found | fail-safe) -> scope evaluated -> allow/deny. No retries; those
/// belong to the caller.
pub struct PermissionService {
    store: Arc<dyn PermissionStore>,
    ownership: Arc<dyn OwnershipResolver>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn PermissionStore>, ownership: Arc<dyn OwnershipResolver>) -> Self {
        Self { store, ownership }
    }

    /// The documented, finite role-variant fallback list: the label as
    /// given, lowercased, then uppercased, deduplicated in that order. This
    /// accommodates permission rows that predate label normalization; the
    /// store itself stays exact-match.
    fn role_variants(role: &str) -> Vec<String> {
        let mut variants: Vec<String> = Vec::with_capacity(3);
        for candidate in [role.to_string(), role.to_lowercase(), role.to_uppercase()] {
            if !variants.contains(&candidate) {
                variants.push(candidate);
            }
        }
        variants
    }

    /// Try every (role variant, resource name) pair in order and stop at the
    /// first hit. The canonical resource name is tried before the raw one so
    /// migrated rows win; the raw name tolerates un-migrated rows keyed by a
    /// pre-canonical alias.
    async fn lookup_record(
        &self,
        user_id: Uuid,
        user_role: &str,
        variants: &[String],
        canonical_resource: &str,
        raw_resource: &str,
        permission_type: PermissionType,
    ) -> Lookup {
        let lookup_type = permission_type.for_lookup();
        let mut resource_names: Vec<&str> = vec![canonical_resource];
        if raw_resource != canonical_resource {
            resource_names.push(raw_resource);
        }

        for variant in variants {
            for resource_name in &resource_names {
                match self.store.find_scope(variant, resource_name, lookup_type).await {
                    Ok(Some(raw_scope)) => {
                        return Lookup::Found {
                            role_variant: variant.clone(),
                            resource_name: (*resource_name).to_string(),
                            raw_scope,
                        };
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::error!(
                            user_id = %user_id,
                            role = %user_role,
                            resource = %canonical_resource,
                            permission = %permission_type.as_str(),
                            error = %err,
                            "permission store lookup failed"
                        );
                        return Lookup::Failed;
                    }
                }
            }
        }

        Lookup::Missing
    }

    /// Full decision with provenance. `check_permission` is the boolean
    /// wrapper most call sites use.
    #[allow(clippy::too_many_arguments)]
    pub async fn decide(
        &self,
        user_id: Uuid,
        user_role: &str,
        user_group_id: Option<i64>,
        resource_type: &str,
        permission_type: PermissionType,
        resource_owner_id: Option<Uuid>,
        resource_group_id: Option<i64>,
    ) -> Decision {
        let raw_resource = resource_type.trim().to_lowercase();
        let canonical_resource = canonicalize_resource(resource_type);
        let canonical_role = super::normalize_role(Some(user_role));
        let variants = Self::role_variants(user_role);

        let lookup = self
            .lookup_record(
                user_id,
                user_role,
                &variants,
                &canonical_resource,
                &raw_resource,
                permission_type,
            )
            .await;

        let (role_variant, resource_name, raw_scope) = match lookup {
            Lookup::Found {
                role_variant,
                resource_name,
                raw_scope,
            } => (role_variant, resource_name, raw_scope),
            Lookup::Missing => {
                return self.log_fallback(
                    fallback_decision(
                        FallbackReason::MissingRecord,
                        &canonical_role,
                        &raw_resource,
                        &canonical_resource,
                        permission_type,
                    ),
                    user_role,
                    &canonical_resource,
                    permission_type,
                    &variants,
                );
            }
            Lookup::Failed => {
                return self.log_fallback(
                    fallback_decision(
                        FallbackReason::StoreError,
                        &canonical_role,
                        &raw_resource,
                        &canonical_resource,
                        permission_type,
                    ),
                    user_role,
                    &canonical_resource,
                    permission_type,
                    &variants,
                );
            }
        };

        let Some(scope) = Scope::parse(&raw_scope) else {
            // A scope value outside the enum means the record table is
            // corrupted; fail closed.
            tracing::error!(
                role_variant = %role_variant,
                resource = %resource_name,
                permission = %permission_type.as_str(),
                scope = %raw_scope,
                "unrecognized scope value in permission record"
            );
            return Decision::deny(DecisionSource::UnknownScope { raw: raw_scope });
        };

        tracing::debug!(
            user_id = %user_id,
            role_variant = %role_variant,
            resource = %resource_name,
            permission = %permission_type.as_str(),
            scope = %scope.as_str(),
            "permission record matched"
        );

        // Group scope against the users resource compares the caller's
        // group with the *target user's* group; resolve it here so scope
        // evaluation stays pure.
        let mut resource_group_id = resource_group_id;
        if scope == Scope::Group
            && effective_group(resource_group_id).is_none()
            && canonical_resource == resources::USERS
        {
            if let Some(target) = resource_owner_id {
                resource_group_id = self
                    .ownership
                    .resource_owner(resources::USERS, target)
                    .await
                    .and_then(|owner| owner.owner_group_id);
            }
        }

        if scope == Scope::Group
            && permission_type.for_lookup() != PermissionType::Create
            && effective_group(resource_group_id).is_none()
        {
            tracing::warn!(
                user_id = %user_id,
                role = %user_role,
                resource = %canonical_resource,
                permission = %permission_type.as_str(),
                "group scope granted without resolvable group context"
            );
        }

        let allowed = resolve_scope(
            scope,
            permission_type,
            user_id,
            user_group_id,
            resource_owner_id,
            resource_group_id,
        );

        if !allowed {
            tracing::warn!(
                user_id = %user_id,
                role = %user_role,
                resource = %canonical_resource,
                permission = %permission_type.as_str(),
                scope = %scope.as_str(),
                owner = ?resource_owner_id,
                "permission denied by scope"
            );
        }

        Decision {
            allowed,
            source: DecisionSource::Record { scope, role_variant },
        }
    }

    /// Boolean contract used by route handlers and UI gating.
    #[allow(clippy::too_many_arguments)]
    pub async fn check_permission(
        &self,
        user_id: Uuid,
        user_role: &str,
        user_group_id: Option<i64>,
        resource_type: &str,
        permission_type: PermissionType,
        resource_owner_id: Option<Uuid>,
        resource_group_id: Option<i64>,
    ) -> bool {
        self.decide(
            user_id,
            user_role,
            user_group_id,
            resource_type,
            permission_type,
            resource_owner_id,
            resource_group_id,
        )
        .await
        .allowed
    }

    /// Decision for a concrete resource instance: resolves ownership first,
    /// then evaluates. Unresolvable ownership flows through as absence and
    /// denies under `own` scope.
    pub async fn decide_for_resource(
        &self,
        user_id: Uuid,
        user_role: &str,
        user_group_id: Option<i64>,
        resource_type: &str,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    ) -> Decision {
        let owner = match resource_id {
            Some(id) => {
                let canonical = canonicalize_resource(resource_type);
                self.ownership.resource_owner(&canonical, id).await
            }
            None => None,
        };

        self.decide(
            user_id,
            user_role,
            user_group_id,
            resource_type,
            permission_type,
            owner.and_then(|o| o.owner_id),
            owner.and_then(|o| o.owner_group_id),
        )
        .await
    }

    /// Collection access (listing): the record for the requested action
    /// grants when its scope is not `none`, since a collection has no
    /// single owner to compare against. The returned scope tells the caller
    /// how to narrow the query (own -> caller's rows, group -> caller's
    /// group, all -> unrestricted). Fail-safe branches behave as for any
    /// other check and read as unrestricted.
    pub async fn decide_collection(
        &self,
        user_id: Uuid,
        user_role: &str,
        resource_type: &str,
        permission_type: PermissionType,
    ) -> Decision {
        let raw_resource = resource_type.trim().to_lowercase();
        let canonical_resource = canonicalize_resource(resource_type);
        let canonical_role = super::normalize_role(Some(user_role));
        let variants = Self::role_variants(user_role);

        let lookup = self
            .lookup_record(
                user_id,
                user_role,
                &variants,
                &canonical_resource,
                &raw_resource,
                permission_type,
            )
            .await;

        match lookup {
            Lookup::Found {
                role_variant,
                resource_name,
                raw_scope,
            } => {
                let Some(scope) = Scope::parse(&raw_scope) else {
                    tracing::error!(
                        role_variant = %role_variant,
                        resource = %resource_name,
                        permission = %permission_type.as_str(),
                        scope = %raw_scope,
                        "unrecognized scope value in permission record"
                    );
                    return Decision::deny(DecisionSource::UnknownScope { raw: raw_scope });
                };

                Decision {
                    allowed: scope != Scope::None,
                    source: DecisionSource::Record { scope, role_variant },
                }
            }
            Lookup::Missing => self.log_fallback(
                fallback_decision(
                    FallbackReason::MissingRecord,
                    &canonical_role,
                    &raw_resource,
                    &canonical_resource,
                    permission_type,
                ),
                user_role,
                &canonical_resource,
                permission_type,
                &variants,
            ),
            Lookup::Failed => self.log_fallback(
                fallback_decision(
                    FallbackReason::StoreError,
                    &canonical_role,
                    &raw_resource,
                    &canonical_resource,
                    permission_type,
                ),
                user_role,
                &canonical_resource,
                permission_type,
                &variants,
            ),
        }
    }

    fn log_fallback(
        &self,
        decision: Decision,
        role: &str,
        canonical_resource: &str,
        permission_type: PermissionType,
        variants_tried: &[String],
    ) -> Decision {
        tracing::warn!(
            role = %role,
            resource = %canonical_resource,
            permission = %permission_type.as_str(),
            variants_tried = ?variants_tried,
            allowed = decision.allowed,
            source = ?decision.source,
            "no usable permission record; fail-safe policy applied"
        );
        decision
    }
}
