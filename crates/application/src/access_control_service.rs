use std::sync::Arc;

use chrono::{DateTime, Utc};
use rolegate_core::{ActorContext, AppResult, PrincipalId, TenantId};
use rolegate_domain::{
    AccessContext, AdvancedPermission, AssignmentId, CustomRole, CustomRoleId, HierarchyLevel,
    PermissionCatalog, PermissionGrant, PermissionMap, RoleHierarchy,
};

use crate::authorization_ports::{
    AdvancedPermissionInput, AssignmentResult, BulkAssignmentResult, CreateCustomRoleInput,
    CustomRoleDefinition, CustomRolePatch, DeletionResult, GrantInput, RemovalResult,
    RoleSummary,
};
use crate::{
    AuditRepository, AuthorizationRepository, CustomRoleService, EffectivePermissionResolver,
    RoleAssignmentService, RoleHierarchyService, SecurityAdminRepository,
};

/// Entry point wiring every authorization service over the same ports.
#[derive(Clone)]
pub struct AccessControlService {
    resolver: EffectivePermissionResolver,
    hierarchy_service: RoleHierarchyService,
    custom_role_service: CustomRoleService,
    assignment_service: RoleAssignmentService,
}

impl AccessControlService {
    /// Creates the service graph from one hierarchy configuration and the persistence ports.
    #[must_use]
    pub fn new(
        hierarchy: RoleHierarchy,
        repository: Arc<dyn AuthorizationRepository>,
        admin_repository: Arc<dyn SecurityAdminRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        let resolver = EffectivePermissionResolver::new(repository.clone());
        let hierarchy_service = RoleHierarchyService::new(
            hierarchy,
            repository.clone(),
            admin_repository.clone(),
            audit_repository.clone(),
        );
        let custom_role_service = CustomRoleService::new(
            hierarchy_service.clone(),
            resolver.clone(),
            repository.clone(),
            admin_repository.clone(),
            audit_repository.clone(),
        );
        let assignment_service = RoleAssignmentService::new(
            hierarchy_service.clone(),
            custom_role_service.clone(),
            resolver.clone(),
            repository,
            admin_repository,
            audit_repository,
        );

        Self {
            resolver,
            hierarchy_service,
            custom_role_service,
            assignment_service,
        }
    }

    /// Resolves the complete permission map of a principal.
    pub async fn resolve_effective_permissions(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<PermissionMap> {
        self.resolver.resolve(tenant_id, principal_id).await
    }

    /// Returns whether a principal holds a permission.
    pub async fn has_permission(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        permission: &str,
        context: Option<&AccessContext>,
    ) -> AppResult<bool> {
        self.resolver
            .has_permission(tenant_id, principal_id, permission, context)
            .await
    }

    /// Returns the permission catalog visible in a tenant.
    pub async fn permission_catalog(&self, tenant_id: TenantId) -> AppResult<PermissionCatalog> {
        self.resolver.catalog(tenant_id).await
    }

    /// Lists active roles the actor may assign.
    pub async fn list_assignable_roles(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
    ) -> AppResult<Vec<RoleSummary>> {
        self.hierarchy_service
            .assignable_roles(actor, tenant_id)
            .await
    }

    /// Lists one page of roles visible to the actor, with the total count.
    pub async fn list_visible_roles(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        page: usize,
        page_size: usize,
    ) -> AppResult<(Vec<RoleSummary>, usize)> {
        self.hierarchy_service
            .visible_roles(actor, tenant_id, page, page_size)
            .await
    }

    /// Assigns a role to a principal.
    pub async fn assign_role(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        principal_id: PrincipalId,
        role_identifier: &str,
        advanced_permissions: Vec<AdvancedPermissionInput>,
    ) -> AppResult<AssignmentResult> {
        self.assignment_service
            .assign(
                actor,
                tenant_id,
                principal_id,
                role_identifier,
                advanced_permissions,
            )
            .await
    }

    /// Assigns a role that is only effective inside a validity window.
    pub async fn assign_role_for_window(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        principal_id: PrincipalId,
        role_identifier: &str,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> AppResult<AssignmentResult> {
        self.assignment_service
            .assign_for_window(
                actor,
                tenant_id,
                principal_id,
                role_identifier,
                Vec::new(),
                valid_from,
                valid_until,
            )
            .await
    }

    /// Assigns a role to several principals.
    pub async fn bulk_assign_role(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        principal_ids: Vec<PrincipalId>,
        role_identifier: &str,
    ) -> AppResult<BulkAssignmentResult> {
        self.assignment_service
            .bulk_assign(actor, tenant_id, principal_ids, role_identifier)
            .await
    }

    /// Removes a role from a principal.
    pub async fn remove_role(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        principal_id: PrincipalId,
        role_identifier: &str,
    ) -> AppResult<RemovalResult> {
        self.assignment_service
            .remove(actor, tenant_id, principal_id, role_identifier)
            .await
    }

    /// Replaces the overlays of an assignment.
    pub async fn set_advanced_permissions(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        assignment_id: AssignmentId,
        advanced_permissions: Vec<AdvancedPermissionInput>,
    ) -> AppResult<Vec<AdvancedPermission>> {
        self.assignment_service
            .set_advanced_permissions(actor, tenant_id, assignment_id, advanced_permissions)
            .await
    }

    /// Grants a permission directly to a principal.
    pub async fn grant_direct_permission(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        principal_id: PrincipalId,
        grant: GrantInput,
    ) -> AppResult<PermissionGrant> {
        self.assignment_service
            .grant_direct_permission(actor, tenant_id, principal_id, grant)
            .await
    }

    /// Revokes a direct grant.
    pub async fn revoke_direct_permission(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        principal_id: PrincipalId,
        permission: &str,
    ) -> AppResult<()> {
        self.assignment_service
            .revoke_direct_permission(actor, tenant_id, principal_id, permission)
            .await
    }

    /// Creates a custom role.
    pub async fn create_custom_role(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        input: CreateCustomRoleInput,
    ) -> AppResult<CustomRoleDefinition> {
        self.custom_role_service
            .create(actor, tenant_id, input)
            .await
    }

    /// Updates a custom role found by id, name or derived identifier.
    pub async fn update_custom_role(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        identifier: &str,
        patch: CustomRolePatch,
    ) -> AppResult<CustomRoleDefinition> {
        self.custom_role_service
            .update(actor, tenant_id, identifier, patch)
            .await
    }

    /// Soft-deletes a custom role.
    pub async fn delete_custom_role(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        identifier: &str,
        force: bool,
    ) -> AppResult<DeletionResult> {
        self.custom_role_service
            .delete(actor, tenant_id, identifier, force)
            .await
    }

    /// Re-levels a custom role.
    pub async fn move_custom_role(
        &self,
        tenant_id: TenantId,
        actor: &ActorContext,
        role_id: CustomRoleId,
        new_level: HierarchyLevel,
    ) -> AppResult<CustomRole> {
        self.hierarchy_service
            .move_custom_role(actor, tenant_id, role_id, new_level)
            .await
    }
}
