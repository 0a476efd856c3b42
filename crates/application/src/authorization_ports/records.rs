use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rolegate_core::{PrincipalId, TenantId};
use rolegate_domain::{
    AdvancedPermission, Assignment, AssignmentId, CustomRole, CustomRoleId, HierarchyLevel,
    PermissionDefinition, PermissionGrant,
};

/// Stored catalog row before key validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Stable permission identifier.
    pub permission_id: String,
    /// Display or legacy name.
    pub name: String,
    /// Stored resource part.
    pub resource: String,
    /// Stored action part.
    pub action: String,
    /// Optional description.
    pub description: Option<String>,
    /// Inactive rows stay in the key space but cannot be granted.
    pub is_active: bool,
}

impl From<PermissionDefinition> for CatalogRecord {
    fn from(definition: PermissionDefinition) -> Self {
        Self {
            resource: definition.key.resource().to_owned(),
            action: definition.key.action().to_owned(),
            permission_id: definition.permission_id,
            name: definition.name,
            description: definition.description,
            is_active: definition.is_active,
        }
    }
}

/// Principal projection used for tenant and activity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrincipalRecord {
    /// Principal identifier.
    pub principal_id: PrincipalId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Inactive principals hold no permissions.
    pub is_active: bool,
}

/// Stored grant row for a role or a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantRecord {
    /// Stored permission identifier, in either accepted string form.
    pub permission: String,
    /// Stored scope value.
    pub scope: Option<String>,
    /// Level cap condition.
    pub max_role_level: Option<HierarchyLevel>,
    /// Tenant condition.
    pub allowed_tenants: BTreeSet<TenantId>,
    /// Field restriction.
    pub allowed_fields: Option<BTreeSet<String>>,
}

impl From<&PermissionGrant> for GrantRecord {
    fn from(grant: &PermissionGrant) -> Self {
        Self {
            permission: grant.key.to_string(),
            scope: grant.scope.map(|scope| scope.as_str().to_owned()),
            max_role_level: grant.conditions.max_role_level,
            allowed_tenants: grant.conditions.allowed_tenants.clone(),
            allowed_fields: grant.allowed_fields.clone(),
        }
    }
}

/// Stored overlay row keyed by resource and action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayRecord {
    /// Stored resource part.
    pub resource: String,
    /// Stored action part.
    pub action: String,
    /// Stored scope value.
    pub scope: Option<String>,
    /// Level cap condition.
    pub max_role_level: Option<HierarchyLevel>,
    /// Tenant condition.
    pub allowed_tenants: BTreeSet<TenantId>,
    /// Field restriction.
    pub allowed_fields: Option<BTreeSet<String>>,
}

impl From<&AdvancedPermission> for OverlayRecord {
    fn from(overlay: &AdvancedPermission) -> Self {
        Self {
            resource: overlay.key.resource().to_owned(),
            action: overlay.key.action().to_owned(),
            scope: Some(overlay.scope.as_str().to_owned()),
            max_role_level: overlay.conditions.max_role_level,
            allowed_tenants: overlay.conditions.allowed_tenants.clone(),
            allowed_fields: overlay.allowed_fields.clone(),
        }
    }
}

/// Stored assignment row before its role reference is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRecord {
    /// Assignment identifier.
    pub assignment_id: AssignmentId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Assigned principal.
    pub principal_id: PrincipalId,
    /// Stored system role type, when the assignment references one.
    pub role_type: Option<String>,
    /// Custom role, when the assignment references one.
    pub custom_role_id: Option<CustomRoleId>,
    /// Actor that created the assignment.
    pub assigned_by: PrincipalId,
    /// Creation timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Start of the validity window.
    pub valid_from: Option<DateTime<Utc>>,
    /// Exclusive end of the validity window.
    pub valid_until: Option<DateTime<Utc>>,
    /// Active flag.
    pub is_active: bool,
    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AssignmentRecord {
    /// Builds the stored form of a domain assignment.
    #[must_use]
    pub fn from_assignment(assignment: &Assignment) -> Self {
        Self {
            assignment_id: assignment.assignment_id,
            tenant_id: assignment.tenant_id,
            principal_id: assignment.principal_id,
            role_type: assignment
                .role
                .as_system()
                .map(|role| role.as_str().to_owned()),
            custom_role_id: assignment.role.as_custom(),
            assigned_by: assignment.assigned_by,
            assigned_at: assignment.assigned_at,
            valid_from: assignment.valid_from,
            valid_until: assignment.valid_until,
            is_active: assignment.is_active,
            deleted_at: assignment.deleted_at,
        }
    }

    /// Returns whether the row is active and not deleted, whatever its window.
    ///
    /// A live row holds its role: it blocks a second assignment of the same
    /// role and keeps a custom role in use.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    /// Returns whether the row is live and inside its window at `now`.
    #[must_use]
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.is_live()
            && self.valid_from.is_none_or(|valid_from| valid_from <= now)
            && self.valid_until.is_none_or(|valid_until| now < valid_until)
    }
}

/// Custom role and its grants, written as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomRole {
    /// Role to insert.
    pub role: CustomRole,
    /// Grants to insert with it.
    pub grants: Vec<PermissionGrant>,
}

/// Custom role state after a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRoleUpdate {
    /// Full role row after the patch.
    pub role: CustomRole,
    /// Replacement grant set; `None` keeps the stored grants.
    pub grants: Option<Vec<PermissionGrant>>,
}

/// Assignment and its overlays, written as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    /// Assignment to insert.
    pub assignment: Assignment,
    /// Overlays to attach.
    pub overlays: Vec<AdvancedPermission>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rolegate_core::{PrincipalId, TenantId};
    use rolegate_domain::{Assignment, AssignmentId, RoleRef, SystemRole};

    use super::AssignmentRecord;

    fn record() -> AssignmentRecord {
        AssignmentRecord::from_assignment(&Assignment {
            assignment_id: AssignmentId::new(),
            tenant_id: TenantId::new(),
            principal_id: PrincipalId::new(),
            role: RoleRef::System(SystemRole::Employee),
            assigned_by: PrincipalId::new(),
            assigned_at: Utc::now(),
            valid_from: None,
            valid_until: None,
            is_active: true,
            deleted_at: None,
        })
    }

    #[test]
    fn open_window_record_is_effective() {
        let open = record();
        assert!(open.is_effective_at(Utc::now()));
        assert_eq!(open.role_type.as_deref(), Some("EMPLOYEE"));
    }

    #[test]
    fn validity_window_is_half_open() {
        let now = Utc::now();
        let mut scheduled = record();
        scheduled.valid_from = Some(now + Duration::hours(1));
        assert!(!scheduled.is_effective_at(now));

        let mut expired = record();
        expired.valid_until = Some(now);
        assert!(!expired.is_effective_at(now));
    }

    #[test]
    fn scheduled_rows_are_live_until_deactivated() {
        let mut scheduled = record();
        scheduled.valid_from = Some(Utc::now() + Duration::days(3));
        assert!(scheduled.is_live());

        let mut deleted = record();
        deleted.deleted_at = Some(Utc::now());
        assert!(!deleted.is_live());
        assert!(!deleted.is_effective_at(Utc::now()));

        let mut inactive = record();
        inactive.is_active = false;
        assert!(!inactive.is_live());
    }
}
