use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rolegate_core::{AppResult, PrincipalId, TenantId};
use rolegate_domain::{
    AdvancedPermission, Assignment, AssignmentId, CustomRole, CustomRoleId, PermissionGrant,
    PermissionKey,
};

use super::records::{
    AssignmentRecord, CatalogRecord, CustomRoleUpdate, GrantRecord, NewAssignment, NewCustomRole,
    OverlayRecord, PrincipalRecord,
};

/// Read port for everything resolution and hierarchy checks need.
#[async_trait]
pub trait AuthorizationRepository: Send + Sync {
    /// Lists global catalog entries plus entries scoped to the tenant.
    async fn list_catalog_permissions(&self, tenant_id: TenantId) -> AppResult<Vec<CatalogRecord>>;

    /// Finds a principal in any tenant.
    async fn find_principal(&self, principal_id: PrincipalId) -> AppResult<Option<PrincipalRecord>>;

    /// Returns the tenant's designated custom role baseline, as stored.
    async fn custom_role_baseline(&self, tenant_id: TenantId) -> AppResult<Option<String>>;

    /// Lists every assignment row of a principal, including inactive ones.
    async fn list_assignments_for_principal(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<AssignmentRecord>>;

    /// Finds one assignment row.
    async fn find_assignment(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
    ) -> AppResult<Option<AssignmentRecord>>;

    /// Lists grants attached to a stored system role type.
    async fn list_system_role_grants(&self, role_type: &str) -> AppResult<Vec<GrantRecord>>;

    /// Lists grants attached to a custom role.
    async fn list_custom_role_grants(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<Vec<GrantRecord>>;

    /// Lists overlays attached to one assignment.
    async fn list_advanced_permissions(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<OverlayRecord>>;

    /// Lists principal-level direct grants.
    async fn list_direct_grants(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<GrantRecord>>;

    /// Finds a custom role, deleted or not.
    async fn find_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<Option<CustomRole>>;

    /// Lists tenant custom roles.
    async fn list_custom_roles(
        &self,
        tenant_id: TenantId,
        include_deleted: bool,
    ) -> AppResult<Vec<CustomRole>>;

    /// Counts active, non-deleted assignments referencing a custom role.
    async fn count_active_assignments_for_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<u64>;
}

/// Write port for role and assignment administration.
///
/// Every method is one atomic unit of work.
#[async_trait]
pub trait SecurityAdminRepository: Send + Sync {
    /// Inserts a custom role together with its grants.
    async fn create_custom_role(&self, tenant_id: TenantId, input: NewCustomRole) -> AppResult<()>;

    /// Updates a custom role and optionally replaces its whole grant set.
    async fn update_custom_role(
        &self,
        tenant_id: TenantId,
        input: CustomRoleUpdate,
    ) -> AppResult<()>;

    /// Soft-deletes a custom role.
    ///
    /// Without `force` fails with `RoleInUse` when active assignments remain.
    /// With `force` deactivates and soft-deletes those assignments, drops
    /// their overlays and removes the role grants. Returns the number of
    /// cascaded assignments.
    async fn delete_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
        force: bool,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Inserts an assignment and its overlays.
    async fn create_assignment(&self, tenant_id: TenantId, input: NewAssignment) -> AppResult<()>;

    /// Inserts several assignments in one batch.
    async fn create_assignments(
        &self,
        tenant_id: TenantId,
        assignments: Vec<Assignment>,
    ) -> AppResult<()>;

    /// Deactivates one active assignment and drops its overlays.
    async fn deactivate_assignment(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        removed_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Replaces every overlay of one assignment.
    async fn replace_advanced_permissions(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        overlays: Vec<AdvancedPermission>,
    ) -> AppResult<()>;

    /// Inserts or replaces a principal-level grant.
    async fn save_direct_grant(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        grant: PermissionGrant,
        granted_by: PrincipalId,
    ) -> AppResult<()>;

    /// Removes a principal-level grant. Returns whether one existed.
    async fn delete_direct_grant(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        key: &PermissionKey,
    ) -> AppResult<bool>;
}
