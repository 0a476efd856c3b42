use std::sync::Arc;

use chrono::Utc;
use rolegate_core::{AppError, AppResult, PrincipalId, TenantId};
use rolegate_domain::{
    AccessContext, HierarchyLevel, PermissionCatalog, PermissionGrant, PermissionKey,
    PermissionMap, RoleRef, Standing,
};
use tracing::debug;

use crate::AuthorizationRepository;
use crate::authorization_ports::{AssignmentRecord, PrincipalRecord};
use crate::permission_ingest::{
    StoredRole, catalog_from_records, grants_from_records, overlays_from_records, stored_role,
};


/// Merges every permission source of a principal into one decision map.
#[derive(Clone)]
pub struct EffectivePermissionResolver {
    repository: Arc<dyn AuthorizationRepository>,
}

impl EffectivePermissionResolver {
    /// Creates a resolver over a read repository.
    #[must_use]
    pub fn new(repository: Arc<dyn AuthorizationRepository>) -> Self {
        Self { repository }
    }

    /// Loads the catalog visible in a tenant.
    pub async fn catalog(&self, tenant_id: TenantId) -> AppResult<PermissionCatalog> {
        let records = self.repository.list_catalog_permissions(tenant_id).await?;
        Ok(catalog_from_records(records))
    }

    /// Resolves the complete permission map of a principal.
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<PermissionMap> {
        let principal = self.tenant_principal(tenant_id, principal_id).await?;
        let catalog = self.catalog(tenant_id).await?;
        self.resolve_principal(&principal, &catalog).await
    }

    /// Returns whether a principal holds a key, honouring conditions when a context is given.
    pub async fn has_permission(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        permission: &str,
        context: Option<&AccessContext>,
    ) -> AppResult<bool> {
        let key = PermissionKey::parse(permission)?;
        let map = self.resolve(tenant_id, principal_id).await?;

        Ok(match context {
            Some(context) => map.permits(&key, context),
            None => map.is_granted(&key),
        })
    }

    /// Ensures the actor already holds every grant it tries to hand out, in a
    /// form at least as broad as the one handed out.
    ///
    /// Top-level actors are exempt.
    pub(crate) async fn ensure_grant_ceiling<'a>(
        &self,
        actor: &Standing,
        grants: impl IntoIterator<Item = &'a PermissionGrant>,
    ) -> AppResult<()> {
        if actor.best_level == Some(HierarchyLevel::TOP) {
            return Ok(());
        }

        let map = self.resolve(actor.tenant_id, actor.principal_id).await?;
        let exceeding = grants
            .into_iter()
            .filter(|grant| !map.covers(grant))
            .map(|grant| grant.key.to_string())
            .collect::<Vec<_>>();

        if exceeding.is_empty() {
            return Ok(());
        }

        Err(AppError::HierarchyViolation(format!(
            "actor '{}' cannot hand out permissions beyond what it holds: {}",
            actor.principal_id,
            exceeding.join(", ")
        )))
    }

    async fn tenant_principal(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<PrincipalRecord> {
        self.repository
            .find_principal(principal_id)
            .await?
            .filter(|principal| principal.tenant_id == tenant_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "principal '{principal_id}' was not found in tenant '{tenant_id}'"
                ))
            })
    }

    async fn resolve_principal(
        &self,
        principal: &PrincipalRecord,
        catalog: &PermissionCatalog,
    ) -> AppResult<PermissionMap> {
        let mut map = PermissionMap::denied(catalog.keys());
        if !principal.is_active {
            return Ok(map);
        }

        let now = Utc::now();
        let assignments = self
            .repository
            .list_assignments_for_principal(principal.tenant_id, principal.principal_id)
            .await?;

        for assignment in assignments
            .iter()
            .filter(|assignment| assignment.is_effective_at(now))
        {
            if let Some(source) = self.resolve_assignment(assignment, catalog).await? {
                map.merge(&source);
            }
        }

        let direct_grants = grants_from_records(
            self.repository
                .list_direct_grants(principal.tenant_id, principal.principal_id)
                .await?,
            "direct grant",
        );
        map.apply_direct_grants(&direct_grants);

        debug!(
            tenant_id = %principal.tenant_id,
            principal_id = %principal.principal_id,
            granted = map.granted_keys().count(),
            "resolved effective permissions"
        );

        Ok(map)
    }

    /// Resolves one assignment in isolation. Unusable custom roles contribute nothing.
    async fn resolve_assignment(
        &self,
        assignment: &AssignmentRecord,
        catalog: &PermissionCatalog,
    ) -> AppResult<Option<PermissionMap>> {
        let Some(role) = stored_role(assignment) else {
            return Ok(None);
        };

        let (mut source, grant_records) = match &role {
            StoredRole::Known(RoleRef::System(system_role)) => (
                PermissionMap::for_role_source(catalog, true),
                self.repository
                    .list_system_role_grants(system_role.as_str())
                    .await?,
            ),
            StoredRole::Known(RoleRef::Custom(role_id)) => {
                let usable = self
                    .repository
                    .find_custom_role(assignment.tenant_id, *role_id)
                    .await?
                    .is_some_and(|role| role.is_usable());
                if !usable {
                    return Ok(None);
                }

                (
                    PermissionMap::for_role_source(catalog, true),
                    self.repository
                        .list_custom_role_grants(assignment.tenant_id, *role_id)
                        .await?,
                )
            }
            StoredRole::Unrecognized(role_type) => (
                PermissionMap::for_role_source(catalog, false),
                self.repository.list_system_role_grants(role_type).await?,
            ),
        };

        let source_label = match &role {
            StoredRole::Known(role) => role.to_string(),
            StoredRole::Unrecognized(role_type) => role_type.clone(),
        };
        source.apply_role_grants(&grants_from_records(grant_records, source_label.as_str()));

        let overlays = overlays_from_records(
            self.repository
                .list_advanced_permissions(assignment.tenant_id, assignment.assignment_id)
                .await?,
            assignment.assignment_id,
        );
        source.apply_overlays(&overlays);

        Ok(Some(source))
    }
}
