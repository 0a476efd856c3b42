use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rolegate_core::{ActorContext, AppError, AppResult, PrincipalId, TenantId};
use rolegate_domain::{
    AdvancedPermission, Assignment, AssignmentId, AuditAction, HierarchyLevel, PermissionGrant,
    PermissionKey, RoleRef, Standing, SystemRole,
};
use tracing::info;

use crate::authorization_ports::{
    AdvancedPermissionInput, AssignmentRecord, AssignmentResult, BulkAssignmentFailure,
    BulkAssignmentResult, GrantInput, NewAssignment, RemovalResult, record_committed_event,
};
use crate::permission_ingest::{
    StoredRole, grants_from_inputs, overlays_from_inputs, overlays_from_records, stored_role,
};
use crate::{
    AuditEvent, AuditRepository, AuthorizationRepository, CustomRoleService,
    EffectivePermissionResolver, RoleHierarchyService, SecurityAdminRepository,
};


/// Hierarchy-checked assignment, removal and direct grant workflows.
#[derive(Clone)]
pub struct RoleAssignmentService {
    hierarchy_service: RoleHierarchyService,
    custom_role_service: CustomRoleService,
    resolver: EffectivePermissionResolver,
    repository: Arc<dyn AuthorizationRepository>,
    admin_repository: Arc<dyn SecurityAdminRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl RoleAssignmentService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        hierarchy_service: RoleHierarchyService,
        custom_role_service: CustomRoleService,
        resolver: EffectivePermissionResolver,
        repository: Arc<dyn AuthorizationRepository>,
        admin_repository: Arc<dyn SecurityAdminRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            hierarchy_service,
            custom_role_service,
            resolver,
            repository,
            admin_repository,
            audit_repository,
        }
    }

    /// Resolves a role identifier to a role reference.
    ///
    /// System role names win; custom roles are matched by id, name, then
    /// derived identifier. Inactive custom roles only resolve when
    /// `require_active` is false.
    pub async fn resolve_role(
        &self,
        tenant_id: TenantId,
        identifier: &str,
        require_active: bool,
    ) -> AppResult<RoleRef> {
        if let Ok(role) = SystemRole::from_str(identifier) {
            return Ok(RoleRef::System(role));
        }

        let role = self
            .custom_role_service
            .find_by_identifier(tenant_id, identifier)
            .await?;
        if require_active && !role.is_active {
            return Err(AppError::NotFound(format!(
                "role '{identifier}' is not active in tenant '{tenant_id}'"
            )));
        }

        Ok(RoleRef::Custom(role.role_id))
    }

    /// Assigns a role with optional overlays and emits an audit event.
    pub async fn assign(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        role_identifier: &str,
        advanced_permissions: Vec<AdvancedPermissionInput>,
    ) -> AppResult<AssignmentResult> {
        self.assign_for_window(
            actor,
            tenant_id,
            principal_id,
            role_identifier,
            advanced_permissions,
            None,
            None,
        )
        .await
    }

    /// Assigns a role that is only effective inside `[valid_from, valid_until)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn assign_for_window(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        role_identifier: &str,
        advanced_permissions: Vec<AdvancedPermissionInput>,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> AppResult<AssignmentResult> {
        if let (Some(valid_from), Some(valid_until)) = (valid_from, valid_until)
            && valid_from >= valid_until
        {
            return Err(AppError::Validation(
                "assignment window must end after it starts".to_owned(),
            ));
        }

        let actor_standing = self.hierarchy_service.actor_standing(actor).await?;
        self.hierarchy_service
            .ensure_tenant_reach(&actor_standing, tenant_id)?;

        let role = self.resolve_role(tenant_id, role_identifier, true).await?;
        let role_level = self.hierarchy_service.level_of(tenant_id, role).await?;
        let target_standing = self
            .hierarchy_service
            .target_standing(tenant_id, principal_id)
            .await?;
        self.hierarchy_service.hierarchy().check_assignment(
            &actor_standing,
            &target_standing,
            role_level,
        )?;

        if self
            .live_assignment(tenant_id, principal_id, role)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyAssigned(format!(
                "principal '{principal_id}' already holds role '{role}'"
            )));
        }

        let overlays = self
            .validated_overlays(&actor_standing, tenant_id, advanced_permissions)
            .await?;

        let assignment = Assignment {
            assignment_id: AssignmentId::new(),
            tenant_id,
            principal_id,
            role,
            assigned_by: actor.principal_id(),
            assigned_at: Utc::now(),
            valid_from,
            valid_until,
            is_active: true,
            deleted_at: None,
        };

        self.admin_repository
            .create_assignment(
                tenant_id,
                NewAssignment {
                    assignment: assignment.clone(),
                    overlays: overlays.clone(),
                },
            )
            .await?;

        let result = AssignmentResult {
            assignment,
            advanced_permissions: overlays,
        };

        info!(
            tenant_id = %tenant_id,
            principal_id = %principal_id,
            role = %role,
            overlays = result.advanced_permissions.len(),
            "assigned role"
        );

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::RoleAssigned,
                resource_type: "assignment".to_owned(),
                resource_id: result.assignment.assignment_id.to_string(),
                detail: Some(format!("assigned role '{role}' to '{principal_id}'")),
                before: None,
                after: serde_json::to_value(&result).ok(),
            },
        )
        .await;

        Ok(result)
    }

    /// Removes an active assignment and its overlays, then emits an audit event.
    pub async fn remove(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        role_identifier: &str,
    ) -> AppResult<RemovalResult> {
        let actor_standing = self.hierarchy_service.actor_standing(actor).await?;
        self.hierarchy_service
            .ensure_tenant_reach(&actor_standing, tenant_id)?;

        let role = self.resolve_role(tenant_id, role_identifier, false).await?;
        let role_level = self.hierarchy_service.level_of(tenant_id, role).await?;
        let target_standing = self
            .hierarchy_service
            .target_standing(tenant_id, principal_id)
            .await?;
        self.hierarchy_service.hierarchy().check_assignment(
            &actor_standing,
            &target_standing,
            role_level,
        )?;

        let existing = self
            .live_assignment(tenant_id, principal_id, role)
            .await?
            .ok_or_else(|| {
                AppError::NotAssigned(format!(
                    "principal '{principal_id}' does not hold role '{role}'"
                ))
            })?;

        self.admin_repository
            .deactivate_assignment(tenant_id, existing.assignment_id, Utc::now())
            .await?;

        info!(
            tenant_id = %tenant_id,
            principal_id = %principal_id,
            role = %role,
            "removed role"
        );

        let result = RemovalResult {
            assignment_id: existing.assignment_id,
            principal_id,
            role,
        };

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::RoleUnassigned,
                resource_type: "assignment".to_owned(),
                resource_id: existing.assignment_id.to_string(),
                detail: Some(format!("removed role '{role}' from '{principal_id}'")),
                before: serde_json::to_value(&result).ok(),
                after: None,
            },
        )
        .await;

        Ok(result)
    }

    /// Assigns one role to many principals with a single batch write.
    pub async fn bulk_assign(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        principal_ids: Vec<PrincipalId>,
        role_identifier: &str,
    ) -> AppResult<BulkAssignmentResult> {
        let actor_standing = self.hierarchy_service.actor_standing(actor).await?;
        self.hierarchy_service
            .ensure_tenant_reach(&actor_standing, tenant_id)?;

        let role = self.resolve_role(tenant_id, role_identifier, true).await?;
        let role_level = self.hierarchy_service.level_of(tenant_id, role).await?;

        let mut seen = BTreeSet::new();
        let mut result = BulkAssignmentResult::default();
        let mut assignments = Vec::new();
        let now = Utc::now();

        for principal_id in principal_ids {
            if !seen.insert(principal_id) {
                continue;
            }

            match self
                .bulk_candidate(&actor_standing, tenant_id, principal_id, role, role_level)
                .await
            {
                Ok(true) => result.skipped.push(principal_id),
                Ok(false) => {
                    result.assigned.push(principal_id);
                    assignments.push(Assignment {
                        assignment_id: AssignmentId::new(),
                        tenant_id,
                        principal_id,
                        role,
                        assigned_by: actor.principal_id(),
                        assigned_at: now,
                        valid_from: None,
                        valid_until: None,
                        is_active: true,
                        deleted_at: None,
                    });
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => result.failed.push(BulkAssignmentFailure {
                    principal_id,
                    error,
                }),
            }
        }

        if !assignments.is_empty() {
            self.admin_repository
                .create_assignments(tenant_id, assignments)
                .await?;
        }

        info!(
            tenant_id = %tenant_id,
            role = %role,
            assigned = result.assigned_count(),
            skipped = result.skipped_count(),
            failed = result.failed_count(),
            "bulk assigned role"
        );

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::RolesBulkAssigned,
                resource_type: "assignment".to_owned(),
                resource_id: role.to_string(),
                detail: Some(format!(
                    "assigned role '{role}' to {} principal(s), skipped {}, failed {}",
                    result.assigned_count(),
                    result.skipped_count(),
                    result.failed_count()
                )),
                before: None,
                after: serde_json::to_value(&result.assigned).ok(),
            },
        )
        .await;

        Ok(result)
    }

    /// Replaces every overlay of an active assignment.
    pub async fn set_advanced_permissions(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        advanced_permissions: Vec<AdvancedPermissionInput>,
    ) -> AppResult<Vec<AdvancedPermission>> {
        let actor_standing = self.hierarchy_service.actor_standing(actor).await?;
        self.hierarchy_service
            .ensure_tenant_reach(&actor_standing, tenant_id)?;

        let record = self
            .repository
            .find_assignment(tenant_id, assignment_id)
            .await?
            .filter(AssignmentRecord::is_live)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "assignment '{assignment_id}' was not found in tenant '{tenant_id}'"
                ))
            })?;
        let Some(StoredRole::Known(role)) = stored_role(&record) else {
            return Err(AppError::NotFound(format!(
                "assignment '{assignment_id}' does not reference a known role"
            )));
        };

        let role_level = self.hierarchy_service.level_of(tenant_id, role).await?;
        let target_standing = self
            .hierarchy_service
            .target_standing(tenant_id, record.principal_id)
            .await?;
        self.hierarchy_service.hierarchy().check_assignment(
            &actor_standing,
            &target_standing,
            role_level,
        )?;

        let overlays = self
            .validated_overlays(&actor_standing, tenant_id, advanced_permissions)
            .await?;
        let before = overlays_from_records(
            self.repository
                .list_advanced_permissions(tenant_id, assignment_id)
                .await?,
            assignment_id,
        );

        self.admin_repository
            .replace_advanced_permissions(tenant_id, assignment_id, overlays.clone())
            .await?;

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::AdvancedPermissionsReplaced,
                resource_type: "assignment".to_owned(),
                resource_id: assignment_id.to_string(),
                detail: Some(format!(
                    "replaced {} advanced permission(s) with {}",
                    before.len(),
                    overlays.len()
                )),
                before: serde_json::to_value(&before).ok(),
                after: serde_json::to_value(&overlays).ok(),
            },
        )
        .await;

        Ok(overlays)
    }

    /// Grants one permission directly to a principal.
    pub async fn grant_direct_permission(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        input: GrantInput,
    ) -> AppResult<PermissionGrant> {
        let actor_standing = self
            .direct_grant_actor(actor, tenant_id, principal_id)
            .await?;

        let grant = grants_from_inputs(vec![input])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::MalformedPermissionKey("no permission identifier supplied".to_owned())
            })?;
        self.resolver
            .catalog(tenant_id)
            .await?
            .ensure_grantable(&grant.key)?;
        self.resolver
            .ensure_grant_ceiling(&actor_standing, [&grant.direct_form()])
            .await?;

        self.admin_repository
            .save_direct_grant(tenant_id, principal_id, grant.clone(), actor.principal_id())
            .await?;

        info!(
            tenant_id = %tenant_id,
            principal_id = %principal_id,
            permission = %grant.key,
            "granted direct permission"
        );

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::DirectGrantCreated,
                resource_type: "direct_grant".to_owned(),
                resource_id: format!("{principal_id}:{}", grant.key),
                detail: Some(format!("granted '{}' to '{principal_id}'", grant.key)),
                before: None,
                after: serde_json::to_value(&grant).ok(),
            },
        )
        .await;

        Ok(grant)
    }

    /// Revokes a direct grant.
    pub async fn revoke_direct_permission(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        permission: &str,
    ) -> AppResult<()> {
        self.direct_grant_actor(actor, tenant_id, principal_id)
            .await?;
        let key = PermissionKey::parse(permission)?;

        let removed = self
            .admin_repository
            .delete_direct_grant(tenant_id, principal_id, &key)
            .await?;
        if !removed {
            return Err(AppError::NotFound(format!(
                "principal '{principal_id}' has no direct grant for '{key}'"
            )));
        }

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::DirectGrantRevoked,
                resource_type: "direct_grant".to_owned(),
                resource_id: format!("{principal_id}:{key}"),
                detail: Some(format!("revoked '{key}' from '{principal_id}'")),
                before: serde_json::to_value(&key).ok(),
                after: None,
            },
        )
        .await;

        Ok(())
    }

    async fn direct_grant_actor(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Standing> {
        let actor_standing = self.hierarchy_service.actor_standing(actor).await?;
        self.hierarchy_service
            .ensure_tenant_reach(&actor_standing, tenant_id)?;
        let hierarchy = self.hierarchy_service.hierarchy();
        hierarchy.check_role_management(&actor_standing)?;

        let target_standing = self
            .hierarchy_service
            .target_standing(tenant_id, principal_id)
            .await?;
        hierarchy.check_target(&actor_standing, &target_standing)?;

        Ok(actor_standing)
    }

    /// Returns `Ok(true)` when the principal already holds the role.
    async fn bulk_candidate(
        &self,
        actor_standing: &Standing,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        role: RoleRef,
        role_level: HierarchyLevel,
    ) -> AppResult<bool> {
        let target_standing = self
            .hierarchy_service
            .target_standing(tenant_id, principal_id)
            .await?;
        self.hierarchy_service.hierarchy().check_assignment(
            actor_standing,
            &target_standing,
            role_level,
        )?;

        Ok(self
            .live_assignment(tenant_id, principal_id, role)
            .await?
            .is_some())
    }

    async fn live_assignment(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        role: RoleRef,
    ) -> AppResult<Option<AssignmentRecord>> {
        Ok(self
            .repository
            .list_assignments_for_principal(tenant_id, principal_id)
            .await?
            .into_iter()
            .find(|record| {
                record.is_live() && stored_role(record) == Some(StoredRole::Known(role))
            }))
    }

    async fn validated_overlays(
        &self,
        actor_standing: &Standing,
        tenant_id: TenantId,
        inputs: Vec<AdvancedPermissionInput>,
    ) -> AppResult<Vec<AdvancedPermission>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let overlays = overlays_from_inputs(inputs)?;
        let catalog = self.resolver.catalog(tenant_id).await?;
        for overlay in &overlays {
            catalog.ensure_grantable(&overlay.key)?;
        }
        let requested = overlays
            .iter()
            .map(AdvancedPermission::as_grant)
            .collect::<Vec<_>>();
        self.resolver
            .ensure_grant_ceiling(actor_standing, &requested)
            .await?;

        Ok(overlays)
    }
}
