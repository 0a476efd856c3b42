use std::sync::Arc;

use chrono::Utc;
use rolegate_core::{ActorContext, AppError, AppResult, PrincipalId, TenantId};
use rolegate_domain::{
    AuditAction, CustomRole, CustomRoleId, HierarchyLevel, RoleHierarchy, RoleRef, Standing,
    SystemRole, derive_role_identifier,
};
use tracing::info;

use crate::authorization_ports::{
    CustomRoleUpdate, PrincipalRecord, RoleSummary, record_committed_event,
};
use crate::permission_ingest::{StoredRole, stored_baseline, stored_role};
use crate::{AuditEvent, AuditRepository, AuthorizationRepository, SecurityAdminRepository};

#[cfg(test)]
mod tests;

/// Largest page accepted by role listings.
const MAX_PAGE_SIZE: usize = 200;

/// Privilege lookups and hierarchy-gated role operations.
#[derive(Clone)]
pub struct RoleHierarchyService {
    hierarchy: RoleHierarchy,
    repository: Arc<dyn AuthorizationRepository>,
    admin_repository: Arc<dyn SecurityAdminRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl RoleHierarchyService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        hierarchy: RoleHierarchy,
        repository: Arc<dyn AuthorizationRepository>,
        admin_repository: Arc<dyn SecurityAdminRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            hierarchy,
            repository,
            admin_repository,
            audit_repository,
        }
    }

    /// Returns the shared hierarchy configuration.
    #[must_use]
    pub fn hierarchy(&self) -> RoleHierarchy {
        self.hierarchy
    }

    /// Returns the tenant's designated custom role baseline, if any.
    pub async fn tenant_baseline(&self, tenant_id: TenantId) -> AppResult<Option<SystemRole>> {
        let stored = self.repository.custom_role_baseline(tenant_id).await?;
        Ok(stored_baseline(stored, tenant_id))
    }

    /// Returns the effective level of a role in a tenant.
    pub async fn level_of(&self, tenant_id: TenantId, role: RoleRef) -> AppResult<HierarchyLevel> {
        match role {
            RoleRef::System(system_role) => Ok(system_role.level()),
            RoleRef::Custom(role_id) => {
                let custom_role = self.find_live_custom_role(tenant_id, role_id).await?;
                let baseline = self.tenant_baseline(tenant_id).await?;
                Ok(self.hierarchy.custom_role_level(&custom_role, baseline))
            }
        }
    }

    /// Returns the standing of the authenticated actor.
    pub async fn actor_standing(&self, actor: &ActorContext) -> AppResult<Standing> {
        let principal = self
            .repository
            .find_principal(actor.principal_id())
            .await?
            .filter(|principal| principal.tenant_id == actor.tenant_id())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "actor '{}' was not found in tenant '{}'",
                    actor.principal_id(),
                    actor.tenant_id()
                ))
            })?;

        self.standing_of(principal).await
    }

    /// Returns the standing of an active principal that must belong to `tenant_id`.
    pub async fn target_standing(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Standing> {
        let principal = self
            .repository
            .find_principal(principal_id)
            .await?
            .filter(|principal| principal.tenant_id == tenant_id && principal.is_active)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "principal '{principal_id}' was not found in tenant '{tenant_id}'"
                ))
            })?;

        self.standing_of(principal).await
    }

    /// Fails with `NotFound` when the actor cannot operate inside `tenant_id`.
    pub fn ensure_tenant_reach(&self, actor: &Standing, tenant_id: TenantId) -> AppResult<()> {
        if actor.can_reach_tenant(tenant_id) {
            return Ok(());
        }

        Err(AppError::NotFound(format!(
            "tenant '{tenant_id}' was not found"
        )))
    }

    /// Returns whether the actor may give `role` to the target principal.
    pub async fn can_assign(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        target_principal_id: PrincipalId,
        role: RoleRef,
    ) -> AppResult<bool> {
        let actor_standing = self.actor_standing(actor).await?;
        self.ensure_tenant_reach(&actor_standing, tenant_id)?;
        let target_standing = self.target_standing(tenant_id, target_principal_id).await?;
        let role_level = self.level_of(tenant_id, role).await?;

        Ok(self
            .hierarchy
            .can_assign(&actor_standing, &target_standing, role_level))
    }

    /// Lists active roles the actor could assign to an unspecified target.
    pub async fn assignable_roles(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
    ) -> AppResult<Vec<RoleSummary>> {
        let actor_standing = self.actor_standing(actor).await?;
        self.ensure_tenant_reach(&actor_standing, tenant_id)?;

        Ok(self
            .role_summaries(tenant_id)
            .await?
            .into_iter()
            .filter(|summary| {
                summary.is_active
                    && self
                        .hierarchy
                        .is_assignable_by(&actor_standing, summary.level)
            })
            .collect())
    }

    /// Lists one page of non-deleted roles at or below the actor, with the total count.
    pub async fn visible_roles(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        page: usize,
        page_size: usize,
    ) -> AppResult<(Vec<RoleSummary>, usize)> {
        if page == 0 || page_size == 0 {
            return Err(AppError::Validation(
                "page and page size must be at least 1".to_owned(),
            ));
        }
        let page_size = page_size.min(MAX_PAGE_SIZE);

        let actor_standing = self.actor_standing(actor).await?;
        self.ensure_tenant_reach(&actor_standing, tenant_id)?;

        let visible = self
            .role_summaries(tenant_id)
            .await?
            .into_iter()
            .filter(|summary| self.hierarchy.is_visible_to(&actor_standing, summary.level))
            .collect::<Vec<_>>();
        let total = visible.len();
        let items = visible
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok((items, total))
    }

    /// Re-levels a custom role and emits an audit event.
    pub async fn move_custom_role(
        &self,
        actor: &ActorContext,
        tenant_id: TenantId,
        role_id: CustomRoleId,
        new_level: HierarchyLevel,
    ) -> AppResult<CustomRole> {
        let actor_standing = self.actor_standing(actor).await?;
        self.ensure_tenant_reach(&actor_standing, tenant_id)?;

        let current = self.find_live_custom_role(tenant_id, role_id).await?;
        let baseline = self.tenant_baseline(tenant_id).await?;
        let current_level = self.hierarchy.custom_role_level(&current, baseline);
        self.hierarchy
            .check_move(&actor_standing, current_level, new_level, baseline)?;

        let mut moved = current.clone();
        moved.level = Some(new_level);
        moved.updated_at = Utc::now();

        self.admin_repository
            .update_custom_role(
                tenant_id,
                CustomRoleUpdate {
                    role: moved.clone(),
                    grants: None,
                },
            )
            .await?;

        info!(
            tenant_id = %tenant_id,
            role_id = %role_id,
            from = %current_level,
            to = %new_level,
            "moved custom role"
        );

        record_committed_event(
            self.audit_repository.as_ref(),
            AuditEvent {
                tenant_id,
                subject: actor.principal_id().to_string(),
                action: AuditAction::CustomRoleMoved,
                resource_type: "custom_role".to_owned(),
                resource_id: role_id.to_string(),
                detail: Some(format!(
                    "moved role '{}' from level {current_level} to {new_level}",
                    moved.name
                )),
                before: serde_json::to_value(&current).ok(),
                after: serde_json::to_value(&moved).ok(),
            },
        )
        .await;

        Ok(moved)
    }

    /// Finds a non-deleted custom role.
    pub(crate) async fn find_live_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<CustomRole> {
        self.repository
            .find_custom_role(tenant_id, role_id)
            .await?
            .filter(|role| role.tenant_id == tenant_id && !role.is_deleted())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "custom role '{role_id}' was not found in tenant '{tenant_id}'"
                ))
            })
    }

    async fn standing_of(&self, principal: PrincipalRecord) -> AppResult<Standing> {
        let mut standing = Standing {
            principal_id: principal.principal_id,
            tenant_id: principal.tenant_id,
            best_level: None,
        };
        if !principal.is_active {
            return Ok(standing);
        }

        let now = Utc::now();
        let assignments = self
            .repository
            .list_assignments_for_principal(principal.tenant_id, principal.principal_id)
            .await?;
        let mut baseline = None;

        for assignment in assignments
            .iter()
            .filter(|assignment| assignment.is_effective_at(now))
        {
            let level = match stored_role(assignment) {
                Some(StoredRole::Known(RoleRef::System(role))) => Some(role.level()),
                Some(StoredRole::Known(RoleRef::Custom(role_id))) => {
                    let custom_role = self
                        .repository
                        .find_custom_role(principal.tenant_id, role_id)
                        .await?
                        .filter(CustomRole::is_usable);
                    match custom_role {
                        Some(custom_role) => {
                            if baseline.is_none() {
                                baseline = Some(self.tenant_baseline(principal.tenant_id).await?);
                            }
                            Some(
                                self.hierarchy
                                    .custom_role_level(&custom_role, baseline.flatten()),
                            )
                        }
                        None => None,
                    }
                }
                Some(StoredRole::Unrecognized(_)) | None => None,
            };

            if let Some(level) = level {
                standing.best_level = Some(
                    standing
                        .best_level
                        .map_or(level, |best_level| best_level.min(level)),
                );
            }
        }

        Ok(standing)
    }

    /// Returns every non-deleted role of a tenant, ordered by level then name.
    async fn role_summaries(&self, tenant_id: TenantId) -> AppResult<Vec<RoleSummary>> {
        let baseline = self.tenant_baseline(tenant_id).await?;
        let mut summaries = SystemRole::all()
            .iter()
            .map(|role| RoleSummary {
                role: RoleRef::System(*role),
                name: role.display_name().to_owned(),
                identifier: role.as_str().to_owned(),
                level: role.level(),
                is_system: true,
                is_active: true,
            })
            .collect::<Vec<_>>();

        summaries.extend(
            self.repository
                .list_custom_roles(tenant_id, false)
                .await?
                .into_iter()
                .filter(|role| !role.is_deleted())
                .map(|role| RoleSummary {
                    role: RoleRef::Custom(role.role_id),
                    identifier: derive_role_identifier(role.name.as_str()),
                    level: self.hierarchy.custom_role_level(&role, baseline),
                    is_system: false,
                    is_active: role.is_active,
                    name: role.name,
                }),
        );

        summaries.sort_by(|left, right| {
            left.level
                .cmp(&right.level)
                .then_with(|| left.name.cmp(&right.name))
        });

        Ok(summaries)
    }
}
