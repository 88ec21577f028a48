use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::DecisionSource;

/// A stored permission record as configured by administrators. The scope
/// column is surfaced raw: diagnostic listings must show corrupted values
/// rather than hide them.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PermissionRecord {
    pub role: String,
    pub resource_type: String,
    pub permission_type: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PermissionCheckQuery {
    /// Resource type, canonical or alias (e.g. `qr_codes`).
    #[param(example = "qr_code")]
    pub resource: String,
    /// Action to authorize.
    #[param(example = "update")]
    pub action: String,
    /// Concrete resource instance, when ownership matters.
    pub resource_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub allowed: bool,
    pub source: DecisionSource,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissionsResponse {
    pub role: String,
    pub records: Vec<PermissionRecord>,
}
