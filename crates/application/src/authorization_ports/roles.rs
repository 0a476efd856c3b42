use std::collections::BTreeSet;

use rolegate_domain::{
    CustomRole, CustomRoleId, GrantConditions, HierarchyLevel, PermissionGrant, PermissionScope,
    RoleRef,
};
use serde::Serialize;

/// Caller-supplied grant before key validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantInput {
    /// Permission identifier, `resource:action` or legacy `ACTION_RESOURCE`.
    pub permission: String,
    /// Optional scope.
    pub scope: Option<PermissionScope>,
    /// Grant conditions.
    pub conditions: GrantConditions,
    /// Optional field restriction.
    pub allowed_fields: Option<BTreeSet<String>>,
}

impl GrantInput {
    /// Creates an unconditional grant input.
    #[must_use]
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            ..Self::default()
        }
    }
}

/// Input payload for creating custom roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateCustomRoleInput {
    /// Role name, unique per tenant among non-deleted roles.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional requested level; clamped to the tenant baseline.
    pub level: Option<HierarchyLevel>,
    /// Grants to attach.
    pub grants: Vec<GrantInput>,
}

/// Partial update of a custom role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomRolePatch {
    /// New name.
    pub name: Option<String>,
    /// New description; `Some(None)` clears it.
    pub description: Option<Option<String>>,
    /// New active flag.
    pub is_active: Option<bool>,
    /// Replacement grant set.
    pub grants: Option<Vec<GrantInput>>,
}

/// Custom role with its resolved level and grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomRoleDefinition {
    /// Stored role.
    pub role: CustomRole,
    /// Level after baseline clamping.
    pub effective_level: HierarchyLevel,
    /// Attached grants.
    pub grants: Vec<PermissionGrant>,
}

/// Result of a custom role deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeletionResult {
    /// Deleted role.
    pub role_id: CustomRoleId,
    /// Assignments deactivated by the cascade.
    pub cascaded_assignments: u64,
}

/// Role projection returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    /// Role reference.
    pub role: RoleRef,
    /// Display name.
    pub name: String,
    /// Role-type identifier callers may pass back.
    pub identifier: String,
    /// Effective level.
    pub level: HierarchyLevel,
    /// Whether the role is a fixed system role.
    pub is_system: bool,
    /// Whether the role can currently be assigned.
    pub is_active: bool,
}
