//! In-process fakes shared by service tests.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use rolegate_core::{ActorContext, AppError, AppResult, PrincipalId, TenantId};
use rolegate_domain::{
    AdvancedPermission, Assignment, AssignmentId, CustomRole, CustomRoleId, PermissionGrant,
    PermissionKey, RoleHierarchy, RoleRef, SystemRole, builtin_definitions,
    builtin_system_role_grants,
};

use crate::{
    AccessControlService, AssignmentRecord, AuditEvent, AuditRepository, AuthorizationRepository,
    CatalogRecord, CustomRoleUpdate, GrantRecord, NewAssignment, NewCustomRole, OverlayRecord,
    PrincipalRecord, SecurityAdminRepository,
};

#[derive(Default)]
pub(crate) struct FakeState {
    pub catalog: Vec<CatalogRecord>,
    pub principals: HashMap<PrincipalId, PrincipalRecord>,
    pub baselines: HashMap<TenantId, String>,
    pub assignments: Vec<AssignmentRecord>,
    pub system_grants: HashMap<String, Vec<GrantRecord>>,
    pub custom_roles: Vec<CustomRole>,
    pub custom_grants: HashMap<CustomRoleId, Vec<GrantRecord>>,
    pub overlays: HashMap<AssignmentId, Vec<OverlayRecord>>,
    pub direct_grants: HashMap<(TenantId, PrincipalId), Vec<GrantRecord>>,
}

impl FakeState {
    fn live_holders_of(&self, tenant_id: TenantId, role_id: CustomRoleId) -> Vec<AssignmentId> {
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

/// Bare port implementation with no uniqueness or tenant checks.
///
/// Stored rows are exactly what the services hand over, so tests can assert
/// on them directly.
#[derive(Default)]
pub(crate) struct FakeStore {
    pub state: Mutex<FakeState>,
    events: Mutex<Vec<AuditEvent>>,
    fail_audit: AtomicBool,
}

pub(crate) fn key(value: &str) -> PermissionKey {
    PermissionKey::parse(value).unwrap_or_else(|error| panic!("invalid test key: {error}"))
}

fn cloned<K: Eq + Hash, V: Clone>(map: &HashMap<K, Vec<V>>, key: &K) -> Vec<V> {
    map.get(key).cloned().unwrap_or_default()
}

fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

impl FakeStore {
    /// Store with the built-in catalog and default system role grants.
    pub(crate) fn seeded() -> Arc<Self> {
        let mut state = FakeState {
            catalog: builtin_definitions().into_iter().map(CatalogRecord::from).collect(),
            ..FakeState::default()
        };

        for (role, keys) in builtin_system_role_grants() {
            state.system_grants.insert(
                role.as_str().to_owned(),
                keys.into_iter()
                    .map(|key| GrantRecord::from(&PermissionGrant::unrestricted(key)))
                    .collect(),
            );
        }

        Arc::new(Self {
            state: Mutex::new(state),
            ..Self::default()
        })
    }

    pub(crate) async fn add_principal(&self, tenant_id: TenantId) -> PrincipalId {
        let principal_id = PrincipalId::new();
        self.state.lock().await.principals.insert(
            principal_id,
            PrincipalRecord {
                principal_id,
                tenant_id,
                is_active: true,
            },
        );
        principal_id
    }

    /// Adds a principal holding a system role and returns its actor context.
    pub(crate) async fn add_actor(&self, tenant_id: TenantId, role: SystemRole) -> ActorContext {
        let principal_id = self.add_principal(tenant_id).await;
        self.insert_assignment(tenant_id, principal_id, RoleRef::System(role))
            .await;
        ActorContext::new(principal_id, tenant_id)
    }

    pub(crate) async fn insert_assignment(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        role: RoleRef,
    ) -> AssignmentId {
        let assignment = Assignment {
            assignment_id: AssignmentId::new(),
            tenant_id,
            principal_id,
            role,
            assigned_by: principal_id,
            assigned_at: Utc::now(),
            valid_from: None,
            valid_until: None,
            is_active: true,
            deleted_at: None,
        };
        self.state
            .lock()
            .await
            .assignments
            .push(AssignmentRecord::from_assignment(&assignment));
        assignment.assignment_id
    }

    pub(crate) async fn set_system_grants(&self, role_type: &str, keys: &[&str]) {
        let grants = keys
            .iter()
            .map(|value| GrantRecord {
                permission: (*value).to_owned(),
                ..GrantRecord::default()
            })
            .collect();
        self.set_system_grant_records(role_type, grants).await;
    }

    pub(crate) async fn set_system_grant_records(&self, role_type: &str, grants: Vec<GrantRecord>) {
        self.state
            .lock()
            .await
            .system_grants
            .insert(role_type.to_owned(), grants);
    }

    /// Live assignments of one principal, scheduled ones included.
    pub(crate) async fn active_assignments(
        &self,
        principal_id: PrincipalId,
    ) -> Vec<AssignmentRecord> {
        self.state
            .lock()
            .await
            .assignments
            .iter()
            .filter(|record| record.principal_id == principal_id && record.is_live())
            .cloned()
            .collect()
    }

    pub(crate) async fn recorded_events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Makes every later audit append fail.
    pub(crate) fn fail_audit_appends(&self) {
        self.fail_audit.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn service(store: &Arc<FakeStore>) -> AccessControlService {
    AccessControlService::new(
        RoleHierarchy::default(),
        store.clone(),
        store.clone(),
        store.clone(),
    )
}

#[async_trait]
impl AuthorizationRepository for FakeStore {
    async fn list_catalog_permissions(
        &self,
        _tenant_id: TenantId,
    ) -> AppResult<Vec<CatalogRecord>> {
        Ok(self.state.lock().await.catalog.clone())
    }

    async fn find_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Option<PrincipalRecord>> {
        Ok(self.state.lock().await.principals.get(&principal_id).copied())
    }

    async fn custom_role_baseline(&self, tenant_id: TenantId) -> AppResult<Option<String>> {
        Ok(self.state.lock().await.baselines.get(&tenant_id).cloned())
    }

    async fn list_assignments_for_principal(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<AssignmentRecord>> {
        let state = self.state.lock().await;
        Ok(state
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
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .iter()
            .find(|record| record.tenant_id == tenant_id && record.assignment_id == assignment_id)
            .cloned())
    }

    async fn list_system_role_grants(&self, role_type: &str) -> AppResult<Vec<GrantRecord>> {
        let state = self.state.lock().await;
        Ok(cloned(&state.system_grants, &role_type.to_owned()))
    }

    async fn list_custom_role_grants(
        &self,
        _tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<Vec<GrantRecord>> {
        Ok(cloned(&self.state.lock().await.custom_grants, &role_id))
    }

    async fn list_advanced_permissions(
        &self,
        _tenant_id: TenantId,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<OverlayRecord>> {
        Ok(cloned(&self.state.lock().await.overlays, &assignment_id))
    }

    async fn list_direct_grants(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<GrantRecord>> {
        let state = self.state.lock().await;
        Ok(cloned(&state.direct_grants, &(tenant_id, principal_id)))
    }

    async fn find_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<Option<CustomRole>> {
        let state = self.state.lock().await;
        Ok(state
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
        let state = self.state.lock().await;
        Ok(state
            .custom_roles
            .iter()
            .filter(|role| role.tenant_id == tenant_id && (include_deleted || !role.is_deleted()))
            .cloned()
            .collect())
    }

    async fn count_active_assignments_for_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<u64> {
        let state = self.state.lock().await;
        Ok(count(state.live_holders_of(tenant_id, role_id).len()))
    }
}

#[async_trait]
impl SecurityAdminRepository for FakeStore {
    async fn create_custom_role(
        &self,
        _tenant_id: TenantId,
        input: NewCustomRole,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let grants = input.grants.iter().map(GrantRecord::from).collect();
        state.custom_grants.insert(input.role.role_id, grants);
        state.custom_roles.push(input.role);
        Ok(())
    }

    async fn update_custom_role(
        &self,
        _tenant_id: TenantId,
        input: CustomRoleUpdate,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let role_id = input.role.role_id;
        let stored = state
            .custom_roles
            .iter_mut()
            .find(|role| role.role_id == role_id)
            .ok_or_else(|| AppError::NotFound(format!("custom role '{role_id}'")))?;
        *stored = input.role;

        if let Some(grants) = input.grants {
            let grants = grants.iter().map(GrantRecord::from).collect();
            state.custom_grants.insert(role_id, grants);
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
        let mut state = self.state.lock().await;
        let holders = state.live_holders_of(tenant_id, role_id);
        if !force && !holders.is_empty() {
            return Err(AppError::RoleInUse {
                role_id: role_id.to_string(),
                count: count(holders.len()),
            });
        }

        for record in &mut state.assignments {
            if holders.contains(&record.assignment_id) {
                record.is_active = false;
                record.deleted_at = Some(deleted_at);
            }
        }
        state.overlays.retain(|assignment_id, _| !holders.contains(assignment_id));
        state.custom_grants.remove(&role_id);
        if let Some(role) = state
            .custom_roles
            .iter_mut()
            .find(|role| role.role_id == role_id)
        {
            role.is_active = false;
            role.deleted_at = Some(deleted_at);
        }

        Ok(count(holders.len()))
    }

    async fn create_assignment(&self, _tenant_id: TenantId, input: NewAssignment) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let overlays = input.overlays.iter().map(OverlayRecord::from).collect();
        state.overlays.insert(input.assignment.assignment_id, overlays);
        state
            .assignments
            .push(AssignmentRecord::from_assignment(&input.assignment));
        Ok(())
    }

    async fn create_assignments(
        &self,
        _tenant_id: TenantId,
        assignments: Vec<Assignment>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state
            .assignments
            .extend(assignments.iter().map(AssignmentRecord::from_assignment));
        Ok(())
    }

    async fn deactivate_assignment(
        &self,
        _tenant_id: TenantId,
        assignment_id: AssignmentId,
        removed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        for record in &mut state.assignments {
            if record.assignment_id == assignment_id {
                record.is_active = false;
                record.deleted_at = Some(removed_at);
            }
        }
        state.overlays.remove(&assignment_id);
        Ok(())
    }

    async fn replace_advanced_permissions(
        &self,
        _tenant_id: TenantId,
        assignment_id: AssignmentId,
        overlays: Vec<AdvancedPermission>,
    ) -> AppResult<()> {
        let overlays = overlays.iter().map(OverlayRecord::from).collect();
        self.state.lock().await.overlays.insert(assignment_id, overlays);
        Ok(())
    }

    async fn save_direct_grant(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        grant: PermissionGrant,
        _granted_by: PrincipalId,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let grants = state
            .direct_grants
            .entry((tenant_id, principal_id))
            .or_default();
        let stored = grant.key.to_string();
        grants.retain(|record| record.permission != stored);
        grants.push(GrantRecord::from(&grant));
        Ok(())
    }

    async fn delete_direct_grant(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        key: &PermissionKey,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let Some(grants) = state.direct_grants.get_mut(&(tenant_id, principal_id)) else {
            return Ok(false);
        };
        let stored = key.to_string();
        let before = grants.len();
        grants.retain(|record| record.permission != stored);
        Ok(grants.len() != before)
    }
}

#[async_trait]
impl AuditRepository for FakeStore {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(AppError::StorageFailure("audit log is unavailable".to_owned()));
        }
        self.events.lock().await.push(event);
        Ok(())
    }
}
