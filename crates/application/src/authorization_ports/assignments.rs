use std::collections::BTreeSet;

use rolegate_core::{AppError, PrincipalId};
use rolegate_domain::{
    AdvancedPermission, Assignment, AssignmentId, GrantConditions, PermissionScope, RoleRef,
};
use serde::Serialize;

/// Caller-supplied overlay before key validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvancedPermissionInput {
    /// Permission identifier, `resource:action` or legacy `ACTION_RESOURCE`.
    pub permission: String,
    /// Scope that replaces the base grant's scope.
    pub scope: PermissionScope,
    /// Conditions that replace the base grant's conditions.
    pub conditions: GrantConditions,
    /// Field restriction that replaces the base grant's list.
    pub allowed_fields: Option<BTreeSet<String>>,
}

/// Result of one role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentResult {
    /// Created assignment.
    pub assignment: Assignment,
    /// Overlays attached to it.
    pub advanced_permissions: Vec<AdvancedPermission>,
}

/// Result of one role removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemovalResult {
    /// Deactivated assignment.
    pub assignment_id: AssignmentId,
    /// Principal that lost the role.
    pub principal_id: PrincipalId,
    /// Removed role.
    pub role: RoleRef,
}

/// Principal that could not be assigned in a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkAssignmentFailure {
    /// Principal that failed.
    pub principal_id: PrincipalId,
    /// Non-fatal reason.
    pub error: AppError,
}

/// Partitioned outcome of a bulk assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkAssignmentResult {
    /// Principals that received the role.
    pub assigned: Vec<PrincipalId>,
    /// Principals that already held the role.
    pub skipped: Vec<PrincipalId>,
    /// Principals rejected by lookup or hierarchy checks.
    pub failed: Vec<BulkAssignmentFailure>,
}

impl BulkAssignmentResult {
    /// Number of new assignments.
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    /// Number of principals already holding the role.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Number of rejected principals.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}
