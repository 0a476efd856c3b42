use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rolegate_core::{ActorContext, AppError, AppResult, NonEmptyString, TenantId};
use rolegate_domain::{
    AuditAction, CustomRole, CustomRoleId, PermissionGrant, Standing, SystemRole,
    derive_role_identifier,
};
use tracing::info;

use crate::authorization_ports::{
    CreateCustomRoleInput, CustomRoleDefinition, CustomRolePatch, CustomRoleUpdate,
    DeletionResult, GrantInput, NewCustomRole, record_committed_event,
};
use crate::permission_ingest::{grants_from_inputs, grants_from_records};
use crate::{
    AuditEvent, AuditRepository, AuthorizationRepository, EffectivePermissionResolver,
    RoleHierarchyService, SecurityAdminRepository,
};

#[cfg(test)]
mod tests;

/// Tenant custom role lifecycle.
#[derive(Clone)]
pub struct CustomRoleService {
    hierarchy_service: RoleHierarchyService,
    resolver: EffectivePermissionResolver,
    repository: Arc<dyn AuthorizationRepository>,
    admin_repository: Arc<dyn SecurityAdminRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl CustomRoleService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        hierarchy_service: RoleHierarchyService,
        resolver: EffectivePermissionResolver,
        repository: Arc<dyn AuthorizationRepository>,
        admin_repository: Arc<dyn SecurityAdminRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            hierarchy_service,
            resolver,
            repository,
            admin_repository,
            audit_repository,
        }
    }

    /// Creates a custom role with its grants and emits an audit event.
    pub async fn create(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        input: CreateCustomRoleInput,
    ) -> AppResult<CustomRoleDefinition> {
        let actor_standing = self.managing_actor(actor, tenant_id).await?;

        let name = NonEmptyString::new(input.name)?;
        self.ensure_name_available(tenant_id, name.as_str(), None)
            .await?;
        let grants = self
            .validated_grants(&actor_standing, tenant_id, input.grants)
            .await?;

        let now = Utc::now();
        let role = CustomRole {
            role_id: CustomRoleId::new(),
            tenant_id,
            name: name.into(),
            description: normalized_description(input.description),
            level: input.level,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let baseline = self.hierarchy_service.tenant_baseline(tenant_id).await?;
        let effective_level = self
            .hierarchy_service
            .hierarchy()
            .custom_role_level(&role, baseline);
        self.hierarchy_service
            .hierarchy()
            .check_custom_role_management(&actor_standing, effective_level)?;

        self.admin_repository
            .create_custom_role(
                tenant_id,
                NewCustomRole {
                    role: role.clone(),
                    grants: grants.clone(),
                },
            )
            .await?;

        let definition = CustomRoleDefinition {
            role,
            effective_level,
            grants,
        };

        info!(
            tenant_id = %tenant_id,
            role_id = %definition.role.role_id,
            grants = definition.grants.len(),
            "created custom role"
        );

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::CustomRoleCreated,
                resource_type: "custom_role".to_owned(),
                resource_id: definition.role.role_id.to_string(),
                detail: Some(format!("created role '{}'", definition.role.name)),
                before: None,
                after: serde_json::to_value(&definition).ok(),
            },
        )
        .await;

        Ok(definition)
    }

    /// Applies a patch to a custom role. A grant list replaces the whole grant set.
    pub async fn update(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        identifier: &str,
        patch: CustomRolePatch,
    ) -> AppResult<CustomRoleDefinition> {
        ensure_not_system_role(identifier)?;
        let actor_standing = self.managing_actor(actor, tenant_id).await?;
        let current = self.find_by_identifier(tenant_id, identifier).await?;
        let before = self.definition(current.clone()).await?;
        self.hierarchy_service
            .hierarchy()
            .check_custom_role_management(&actor_standing, before.effective_level)?;

        let mut role = current;
        if let Some(name) = patch.name {
            let name = NonEmptyString::new(name)?;
            self.ensure_name_available(tenant_id, name.as_str(), Some(role.role_id))
                .await?;
            role.name = name.into();
        }
        if let Some(description) = patch.description {
            role.description = normalized_description(description);
        }
        if let Some(is_active) = patch.is_active {
            role.is_active = is_active;
        }
        let grants = match patch.grants {
            Some(grants) => Some(
                self.validated_grants(&actor_standing, tenant_id, grants)
                    .await?,
            ),
            None => None,
        };
        role.updated_at = Utc::now();

        self.admin_repository
            .update_custom_role(
                tenant_id,
                CustomRoleUpdate {
                    role: role.clone(),
                    grants: grants.clone(),
                },
            )
            .await?;

        let after = CustomRoleDefinition {
            role,
            effective_level: before.effective_level,
            grants: grants.unwrap_or_else(|| before.grants.clone()),
        };

        info!(
            tenant_id = %tenant_id,
            role_id = %after.role.role_id,
            "updated custom role"
        );

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::CustomRoleUpdated,
                resource_type: "custom_role".to_owned(),
                resource_id: after.role.role_id.to_string(),
                detail: Some(format!("updated role '{}'", after.role.name)),
                before: serde_json::to_value(&before).ok(),
                after: serde_json::to_value(&after).ok(),
            },
        )
        .await;

        Ok(after)
    }

    /// Soft-deletes a custom role, cascading to its assignments when forced.
    pub async fn delete(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        identifier: &str,
        force: bool,
    ) -> AppResult<DeletionResult> {
        ensure_not_system_role(identifier)?;
        let actor_standing = self.managing_actor(actor, tenant_id).await?;
        let role = self.find_by_identifier(tenant_id, identifier).await?;
        let before = self.definition(role).await?;
        self.hierarchy_service
            .hierarchy()
            .check_custom_role_management(&actor_standing, before.effective_level)?;

        let role_id = before.role.role_id;
        if !force {
            let count = self
                .repository
                .count_active_assignments_for_custom_role(tenant_id, role_id)
                .await?;
            if count > 0 {
                return Err(AppError::RoleInUse {
                    role_id: role_id.to_string(),
                    count,
                });
            }
        }

        let cascaded_assignments = self
            .admin_repository
            .delete_custom_role(tenant_id, role_id, force, Utc::now())
            .await?;

        info!(
            tenant_id = %tenant_id,
            role_id = %role_id,
            cascaded_assignments,
            "deleted custom role"
        );

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::CustomRoleDeleted,
                resource_type: "custom_role".to_owned(),
                resource_id: role_id.to_string(),
                detail: Some(format!(
                    "deleted role '{}' and deactivated {cascaded_assignments} assignment(s)",
                    before.role.name
                )),
                before: serde_json::to_value(&before).ok(),
                after: None,
            },
        )
        .await;

        Ok(DeletionResult {
            role_id,
            cascaded_assignments,
        })
    }

    /// Finds a non-deleted custom role by id, then exact name, then derived identifier.
    pub async fn find_by_identifier(
        &self,
        tenant_id: TenantId,
        identifier: &str,
    ) -> AppResult<CustomRole> {
        let identifier = identifier.trim();
        let roles = self
            .repository
            .list_custom_roles(tenant_id, false)
            .await?
            .into_iter()
            .filter(|role| !role.is_deleted())
            .collect::<Vec<_>>();

        let by_id = identifier.to_ascii_lowercase();
        let derived = derive_role_identifier(identifier);
        roles
            .iter()
            .find(|role| role.role_id.to_string() == by_id)
            .or_else(|| roles.iter().find(|role| role.name == identifier))
            .or_else(|| roles.iter().find(|role| role.derived_identifier() == derived))
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "role '{identifier}' was not found in tenant '{tenant_id}'"
                ))
            })
    }

    /// Returns a role with its effective level and stored grants.
    pub async fn definition(&self, role: CustomRole) -> AppResult<CustomRoleDefinition> {
        let baseline = self.hierarchy_service.tenant_baseline(role.tenant_id).await?;
        let effective_level = self
            .hierarchy_service
            .hierarchy()
            .custom_role_level(&role, baseline);
        let grants = grants_from_records(
            self.repository
                .list_custom_role_grants(role.tenant_id, role.role_id)
                .await?,
            role.name.as_str(),
        );

        Ok(CustomRoleDefinition {
            role,
            effective_level,
            grants,
        })
    }

    async fn managing_actor(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
    ) -> AppResult<Standing> {
        let actor_standing = self.hierarchy_service.actor_standing(actor).await?;
        self.hierarchy_service
            .ensure_tenant_reach(&actor_standing, tenant_id)?;
        self.hierarchy_service
            .hierarchy()
            .check_role_management(&actor_standing)?;
        Ok(actor_standing)
    }

    async fn ensure_name_available(
        &self,
        tenant_id: TenantId,
        name: &str,
        except: Option<CustomRoleId>,
    ) -> AppResult<()> {
        if SystemRole::from_str(name).is_ok() {
            return Err(AppError::DuplicateName(format!(
                "role name '{name}' collides with a system role"
            )));
        }

        let normalized = name.to_lowercase();
        let taken = self
            .repository
            .list_custom_roles(tenant_id, false)
            .await?
            .iter()
            .any(|role| {
                !role.is_deleted()
                    && Some(role.role_id) != except
                    && role.name.to_lowercase() == normalized
            });
        if taken {
            return Err(AppError::DuplicateName(format!(
                "role '{name}' already exists in tenant '{tenant_id}'"
            )));
        }

        Ok(())
    }

    async fn validated_grants(
        &self,
        actor_standing: &Standing,
        tenant_id: TenantId,
        inputs: Vec<GrantInput>,
    ) -> AppResult<Vec<PermissionGrant>> {
        let grants = grants_from_inputs(inputs)?;

        let mut seen = BTreeSet::new();
        for grant in &grants {
            if !seen.insert(&grant.key) {
                return Err(AppError::Validation(format!(
                    "permission '{}' is granted more than once",
                    grant.key
                )));
            }
        }

        let catalog = self.resolver.catalog(tenant_id).await?;
        for grant in &grants {
            catalog.ensure_grantable(&grant.key)?;
        }

        self.resolver
            .ensure_grant_ceiling(actor_standing, &grants)
            .await?;

        Ok(grants)
    }
}

fn ensure_not_system_role(identifier: &str) -> AppResult<()> {
    match SystemRole::from_str(identifier) {
        Ok(role) => Err(AppError::SystemRoleImmutable(format!(
            "system role '{role}' cannot be modified"
        ))),
        Err(_) => Ok(()),
    }
}

fn normalized_description(description: Option<String>) -> Option<String> {
    description
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
