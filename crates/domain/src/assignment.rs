use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use rolegate_core::{PrincipalId, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::RoleRef;

/// Identifier of one principal-to-role assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentId(Uuid);

impl AssignmentId {
    /// Creates a random assignment identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AssignmentId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Link between one principal and exactly one role inside a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Stable identifier.
    pub assignment_id: AssignmentId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Assigned principal.
    pub principal_id: PrincipalId,
    /// Assigned role.
    pub role: RoleRef,
    /// Actor that created the assignment.
    pub assigned_by: PrincipalId,
    /// Creation timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Start of the validity window.
    pub valid_from: Option<DateTime<Utc>>,
    /// Exclusive end of the validity window.
    pub valid_until: Option<DateTime<Utc>>,
    /// Deactivated assignments are kept for history.
    pub is_active: bool,
    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}
