use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use rolegate_application::{
    AssignmentRecord, AuditEvent, AuditRepository, AuthorizationRepository, CatalogRecord,
    CustomRoleUpdate, GrantRecord, NewAssignment, NewCustomRole, OverlayRecord, PrincipalRecord,
    SecurityAdminRepository,
};
use rolegate_core::{AppError, AppResult, PrincipalId, TenantId};
use rolegate_domain::{
    AdvancedPermission, Assignment, AssignmentId, CustomRole, CustomRoleId, PermissionDefinition,
    PermissionGrant, PermissionKey, SystemRole, builtin_definitions, builtin_system_role_grants,
};


#[derive(Debug, Default)]
struct StoreState {
    baselines: HashMap<TenantId, String>,
    catalog: Vec<(Option<TenantId>, CatalogRecord)>,
    principals: HashMap<PrincipalId, PrincipalRecord>,
    assignments: Vec<AssignmentRecord>,
    system_grants: HashMap<String, Vec<GrantRecord>>,
    custom_roles: Vec<CustomRole>,
    custom_grants: HashMap<CustomRoleId, Vec<GrantRecord>>,
    overlays: HashMap<AssignmentId, Vec<OverlayRecord>>,
    direct_grants: HashMap<(TenantId, PrincipalId), Vec<GrantRecord>>,
}

/// In-memory implementation of every authorization port.
///
/// All state sits behind one lock, so each port call is atomic.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizationStore {
    state: RwLock<StoreState>,
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuthorizationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the built-in catalog and default system role grants.
    #[must_use]
    pub fn with_builtin_catalog() -> Self {
        let mut state = StoreState {
            catalog: builtin_definitions()
                .into_iter()
                .map(|definition| (None, CatalogRecord::from(definition)))
                .collect(),
            ..StoreState::default()
        };

        for (role, keys) in builtin_system_role_grants() {
            state.system_grants.insert(
                role.as_str().to_owned(),
                keys.into_iter()
                    .map(|key| GrantRecord::from(&PermissionGrant::unrestricted(key)))
                    .collect(),
            );
        }

        Self {
            state: RwLock::new(state),
            events: RwLock::new(Vec::new()),
        }
    }

    /// Stores the custom role baseline of a tenant.
    pub async fn set_custom_role_baseline(&self, tenant_id: TenantId, baseline: SystemRole) {
        self.state
            .write()
            .await
            .baselines
            .insert(tenant_id, baseline.as_str().to_owned());
    }

    /// Adds a catalog entry visible only to one tenant.
    pub async fn add_tenant_permission(
        &self,
        tenant_id: TenantId,
        definition: PermissionDefinition,
    ) {
        self.state
            .write()
            .await
            .catalog
            .push((Some(tenant_id), CatalogRecord::from(definition)));
    }

    /// Replaces the grants of a stored system role type.
    pub async fn set_system_role_grants(&self, role_type: &str, grants: &[PermissionGrant]) {
        self.state
            .write()
            .await
            .system_grants
            .insert(role_type.to_owned(), grants.iter().map(GrantRecord::from).collect());
    }

    /// Registers an active principal in a tenant.
    pub async fn add_principal(&self, tenant_id: TenantId) -> PrincipalId {
        let principal_id = PrincipalId::new();
        self.state.write().await.principals.insert(
            principal_id,
            PrincipalRecord {
                principal_id,
                tenant_id,
                is_active: true,
            },
        );
        principal_id
    }

    /// Activates or deactivates a principal.
    pub async fn set_principal_active(
        &self,
        principal_id: PrincipalId,
        is_active: bool,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let principal = state
            .principals
            .get_mut(&principal_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("principal '{principal_id}' was not found"))
            })?;
        principal.is_active = is_active;
        Ok(())
    }

    /// Returns every audit event appended so far.
    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

fn same_stored_permission(stored: &str, key: &PermissionKey) -> bool {
    PermissionKey::parse(stored).is_ok_and(|parsed| &parsed == key)
}

impl StoreState {
    fn live_role_mut(
        &mut self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<&mut CustomRole> {
        self.custom_roles
            .iter_mut()
            .find(|role| {
                role.tenant_id == tenant_id && role.role_id == role_id && !role.is_deleted()
            })
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "custom role '{role_id}' was not found in tenant '{tenant_id}'"
                ))
            })
    }

    fn ensure_name_free(
        &self,
        tenant_id: TenantId,
        name: &str,
        except: Option<CustomRoleId>,
    ) -> AppResult<()> {
        let normalized = name.to_lowercase();
        let taken = self.custom_roles.iter().any(|role| {
            role.tenant_id == tenant_id
                && !role.is_deleted()
                && Some(role.role_id) != except
                && role.name.to_lowercase() == normalized
        });
        if taken {
            return Err(AppError::DuplicateName(format!(
                "role '{name}' already exists"
            )));
        }
        Ok(())
    }

    fn ensure_not_held(&self, assignment: &Assignment) -> AppResult<()> {
        let candidate = AssignmentRecord::from_assignment(assignment);
        let held = self.assignments.iter().any(|record| {
            record.tenant_id == candidate.tenant_id
                && record.principal_id == candidate.principal_id
                && record.role_type == candidate.role_type
                && record.custom_role_id == candidate.custom_role_id
                && record.is_live()
        });
        if held {
            return Err(AppError::AlreadyAssigned(format!(
                "principal '{}' already holds role '{}'",
                assignment.principal_id, assignment.role
            )));
        }
        Ok(())
    }

    fn live_assignments_of(&self, tenant_id: TenantId, role_id: CustomRoleId) -> Vec<AssignmentId> {
        self.assignments
            .iter()
            .filter(|record| {
                record.tenant_id == tenant_id
                    && record.custom_role_id == Some(role_id)
                    && record.is_live()
            })
            .map(|record| record.assignment_id)
            .collect()
    }
}

#[async_trait]
impl AuthorizationRepository for InMemoryAuthorizationStore {
    async fn list_catalog_permissions(&self, tenant_id: TenantId) -> AppResult<Vec<CatalogRecord>> {
        Ok(self
            .state
            .read()
            .await
            .catalog
            .iter()
            .filter(|(scope, _)| scope.is_none_or(|scope| scope == tenant_id))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn find_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Option<PrincipalRecord>> {
        Ok(self.state.read().await.principals.get(&principal_id).copied())
    }

    async fn custom_role_baseline(&self, tenant_id: TenantId) -> AppResult<Option<String>> {
        Ok(self.state.read().await.baselines.get(&tenant_id).cloned())
    }

    async fn list_assignments_for_principal(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<AssignmentRecord>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .iter()
            .filter(|record| record.tenant_id == tenant_id && record.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn find_assignment(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
    ) -> AppResult<Option<AssignmentRecord>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .iter()
            .find(|record| record.tenant_id == tenant_id && record.assignment_id == assignment_id)
            .cloned())
    }

    async fn list_system_role_grants(&self, role_type: &str) -> AppResult<Vec<GrantRecord>> {
        Ok(self
            .state
            .read()
            .await
            .system_grants
            .get(role_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_custom_role_grants(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<Vec<GrantRecord>> {
        let state = self.state.read().await;
        let owned = state
            .custom_roles
            .iter()
            .any(|role| role.tenant_id == tenant_id && role.role_id == role_id);
        if !owned {
            return Ok(Vec::new());
        }

        Ok(state.custom_grants.get(&role_id).cloned().unwrap_or_default())
    }

    async fn list_advanced_permissions(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<OverlayRecord>> {
        let state = self.state.read().await;
        let owned = state
            .assignments
            .iter()
            .any(|record| record.tenant_id == tenant_id && record.assignment_id == assignment_id);
        if !owned {
            return Ok(Vec::new());
        }

        Ok(state.overlays.get(&assignment_id).cloned().unwrap_or_default())
    }

    async fn list_direct_grants(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<GrantRecord>> {
        Ok(self
            .state
            .read()
            .await
            .direct_grants
            .get(&(tenant_id, principal_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<Option<CustomRole>> {
        Ok(self
            .state
            .read()
            .await
            .custom_roles
            .iter()
            .find(|role| role.tenant_id == tenant_id && role.role_id == role_id)
            .cloned())
    }

    async fn list_custom_roles(
        &self,
        tenant_id: TenantId,
        include_deleted: bool,
    ) -> AppResult<Vec<CustomRole>> {
        let mut roles = self
            .state
            .read()
            .await
            .custom_roles
            .iter()
            .filter(|role| role.tenant_id == tenant_id && (include_deleted || !role.is_deleted()))
            .cloned()
            .collect::<Vec<_>>();
        roles.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(roles)
    }

    async fn count_active_assignments_for_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<u64> {
        let count = self
            .state
            .read()
            .await
            .live_assignments_of(tenant_id, role_id)
            .len();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl SecurityAdminRepository for InMemoryAuthorizationStore {
    async fn create_custom_role(&self, tenant_id: TenantId, input: NewCustomRole) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.ensure_name_free(tenant_id, input.role.name.as_str(), None)?;

        state.custom_grants.insert(
            input.role.role_id,
            input.grants.iter().map(GrantRecord::from).collect(),
        );
        state.custom_roles.push(CustomRole {
            tenant_id,
            ..input.role
        });
        Ok(())
    }

    async fn update_custom_role(
        &self,
        tenant_id: TenantId,
        input: CustomRoleUpdate,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let role_id = input.role.role_id;
        state.ensure_name_free(tenant_id, input.role.name.as_str(), Some(role_id))?;

        let stored = state.live_role_mut(tenant_id, role_id)?;
        *stored = CustomRole {
            tenant_id,
            created_at: stored.created_at,
            deleted_at: None,
            ..input.role
        };

        if let Some(grants) = input.grants {
            state
                .custom_grants
                .insert(role_id, grants.iter().map(GrantRecord::from).collect());
        }
        Ok(())
    }

    async fn delete_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
        force: bool,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut state = self.state.write().await;
        state.live_role_mut(tenant_id, role_id)?;

        let referencing = state.live_assignments_of(tenant_id, role_id);
        let cascaded = u64::try_from(referencing.len()).unwrap_or(u64::MAX);
        if !force && cascaded > 0 {
            return Err(AppError::RoleInUse {
                role_id: role_id.to_string(),
                count: cascaded,
            });
        }

        for record in &mut state.assignments {
            if referencing.contains(&record.assignment_id) {
                record.is_active = false;
                record.deleted_at = Some(deleted_at);
            }
        }
        for assignment_id in &referencing {
            state.overlays.remove(assignment_id);
        }
        state.custom_grants.remove(&role_id);

        let role = state.live_role_mut(tenant_id, role_id)?;
        role.is_active = false;
        role.deleted_at = Some(deleted_at);
        role.updated_at = deleted_at;

        Ok(cascaded)
    }

    async fn create_assignment(&self, tenant_id: TenantId, input: NewAssignment) -> AppResult<()> {
        let mut state = self.state.write().await;
        let assignment = Assignment {
            tenant_id,
            ..input.assignment
        };
        state.ensure_not_held(&assignment)?;

        state.overlays.insert(
            assignment.assignment_id,
            input.overlays.iter().map(OverlayRecord::from).collect(),
        );
        state
            .assignments
            .push(AssignmentRecord::from_assignment(&assignment));
        Ok(())
    }

    async fn create_assignments(
        &self,
        tenant_id: TenantId,
        assignments: Vec<Assignment>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let records = assignments
            .into_iter()
            .map(|assignment| Assignment {
                tenant_id,
                ..assignment
            })
            .collect::<Vec<_>>();

        for (index, assignment) in records.iter().enumerate() {
            state.ensure_not_held(assignment)?;
            let repeated = records[..index].iter().any(|earlier| {
                earlier.principal_id == assignment.principal_id && earlier.role == assignment.role
            });
            if repeated {
                return Err(AppError::AlreadyAssigned(format!(
                    "principal '{}' appears twice for role '{}'",
                    assignment.principal_id, assignment.role
                )));
            }
        }

        state
            .assignments
            .extend(records.iter().map(AssignmentRecord::from_assignment));
        Ok(())
    }

    async fn deactivate_assignment(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        removed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let record = state
            .assignments
            .iter_mut()
            .find(|record| {
                record.tenant_id == tenant_id
                    && record.assignment_id == assignment_id
                    && record.is_live()
            })
            .ok_or_else(|| {
                AppError::NotAssigned(format!(
                    "assignment '{assignment_id}' is not active in tenant '{tenant_id}'"
                ))
            })?;
        record.is_active = false;
        record.deleted_at = Some(removed_at);

        state.overlays.remove(&assignment_id);
        Ok(())
    }

    async fn replace_advanced_permissions(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        overlays: Vec<AdvancedPermission>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let live = state.assignments.iter().any(|record| {
            record.tenant_id == tenant_id
                && record.assignment_id == assignment_id
                && record.is_live()
        });
        if !live {
            return Err(AppError::NotFound(format!(
                "assignment '{assignment_id}' was not found in tenant '{tenant_id}'"
            )));
        }

        state
            .overlays
            .insert(assignment_id, overlays.iter().map(OverlayRecord::from).collect());
        Ok(())
    }

    async fn save_direct_grant(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        grant: PermissionGrant,
        _granted_by: PrincipalId,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let grants = state
            .direct_grants
            .entry((tenant_id, principal_id))
            .or_default();
        grants.retain(|record| !same_stored_permission(record.permission.as_str(), &grant.key));
        grants.push(GrantRecord::from(&grant));
        Ok(())
    }

    async fn delete_direct_grant(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        key: &PermissionKey,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(grants) = state.direct_grants.get_mut(&(tenant_id, principal_id)) else {
            return Ok(false);
        };
        let before = grants.len();
        grants.retain(|record| !same_stored_permission(record.permission.as_str(), key));
        Ok(grants.len() != before)
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuthorizationStore {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}
