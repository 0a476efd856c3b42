use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use rolegate_core::{AppError, TenantId};
use rolegate_domain::{
    AuditAction, GrantConditions, HierarchyLevel, PermissionScope, RoleRef, SystemRole,
};

use crate::test_support::{FakeStore, key, service};
use crate::{CreateCustomRoleInput, CustomRolePatch, GrantInput, GrantRecord};

fn input(name: &str, permissions: &[&str]) -> CreateCustomRoleInput {
    CreateCustomRoleInput {
        name: name.to_owned(),
        description: Some("  Reviews trainings  ".to_owned()),
        level: Some(HierarchyLevel::new(45)),
        grants: permissions.iter().map(|value| GrantInput::new(*value)).collect(),
    }
}

fn tenant_scoped_record(permission: &str, tenant_id: TenantId) -> GrantRecord {
    GrantRecord {
        permission: permission.to_owned(),
        scope: Some(PermissionScope::Tenant.as_str().to_owned()),
        allowed_tenants: BTreeSet::from([tenant_id]),
        ..GrantRecord::default()
    }
}

fn tenant_scoped_input(permission: &str, tenant_id: TenantId) -> GrantInput {
    GrantInput {
        scope: Some(PermissionScope::Tenant),
        conditions: GrantConditions {
            allowed_tenants: BTreeSet::from([tenant_id]),
            ..GrantConditions::default()
        },
        ..GrantInput::new(permission)
    }
}

#[tokio::test]
async fn create_persists_role_with_grants_and_audits() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;

    let created = service(&store)
        .create_custom_role(
            tenant_id,
            &actor,
            input(" Training Reviewer ", &["trainings:view", "UPDATE_TRAININGS"]),
        )
        .await;
    assert!(created.is_ok());
    let Ok(definition) = created else {
        return;
    };

    assert_eq!(definition.role.name, "Training Reviewer");
    assert_eq!(
        definition.role.description.as_deref(),
        Some("Reviews trainings")
    );
    assert_eq!(definition.effective_level, HierarchyLevel::new(45));
    assert_eq!(definition.grants.len(), 2);

    let state = store.state.lock().await;
    assert_eq!(state.custom_roles.len(), 1);
    assert_eq!(
        state
            .custom_grants
            .get(&definition.role.role_id)
            .map(Vec::len),
        Some(2)
    );
    drop(state);

    let events = store.recorded_events().await;
    assert_eq!(
        events.first().map(|event| event.action),
        Some(AuditAction::CustomRoleCreated)
    );
    assert!(events.first().is_some_and(|event| event.after.is_some()));
}

#[tokio::test]
async fn create_rejects_duplicate_and_system_names() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;
    let service = service(&store);

    let first = service
        .create_custom_role(tenant_id, &actor, input("Mentor", &["trainings:view"]))
        .await;
    assert!(first.is_ok());

    let duplicate = service
        .create_custom_role(tenant_id, &actor, input("  mentor ", &["trainings:view"]))
        .await;
    assert!(matches!(duplicate, Err(AppError::DuplicateName(_))));

    let system = service
        .create_custom_role(tenant_id, &actor, input("Hr Manager", &["trainings:view"]))
        .await;
    assert!(matches!(system, Err(AppError::DuplicateName(_))));

    let other_tenant = TenantId::new();
    let other_actor = store.add_actor(other_tenant, SystemRole::Admin).await;
    let elsewhere = service
        .create_custom_role(other_tenant, &other_actor, input("Mentor", &["trainings:view"]))
        .await;
    assert!(elsewhere.is_ok());
}

#[tokio::test]
async fn create_rejects_invalid_and_malformed_grants() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::SuperAdmin).await;
    let service = service(&store);

    let unknown = service
        .create_custom_role(tenant_id, &actor, input("Mentor", &["rockets:launch"]))
        .await;
    assert!(matches!(unknown, Err(AppError::InvalidGrant(_))));

    let malformed = service
        .create_custom_role(tenant_id, &actor, input("Mentor", &["nonsense", "::"]))
        .await;
    assert!(matches!(
        malformed,
        Err(AppError::MalformedPermissionKey(_))
    ));

    assert!(store.state.lock().await.custom_roles.is_empty());
}

#[tokio::test]
async fn create_requires_management_floor_and_held_permissions() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let service = service(&store);

    let manager = store.add_actor(tenant_id, SystemRole::Manager).await;
    let below_floor = service
        .create_custom_role(tenant_id, &manager, input("Mentor", &["trainings:view"]))
        .await;
    assert!(matches!(
        below_floor,
        Err(AppError::HierarchyViolation(_))
    ));

    store.set_system_grants("ADMIN", &["users:view"]).await;
    let admin = store.add_actor(tenant_id, SystemRole::Admin).await;
    let escalation = service
        .create_custom_role(tenant_id, &admin, input("Mentor", &["audit:view"]))
        .await;
    assert!(matches!(escalation, Err(AppError::HierarchyViolation(_))));
}

#[tokio::test]
async fn update_replaces_grant_set() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;
    let service = service(&store);
    let created = service
        .create_custom_role(
            tenant_id,
            &actor,
            input("Mentor", &["trainings:view", "trainings:update"]),
        )
        .await;
    assert!(created.is_ok());

    let updated = service
        .update_custom_role(
            tenant_id,
            &actor,
            "MENTOR",
            CustomRolePatch {
                name: Some("Senior Mentor".to_owned()),
                grants: Some(vec![GrantInput::new("reports:view")]),
                ..CustomRolePatch::default()
            },
        )
        .await;
    assert!(updated.is_ok());
    let Ok(definition) = updated else {
        return;
    };

    assert_eq!(definition.role.name, "Senior Mentor");
    assert_eq!(
        definition
            .grants
            .iter()
            .map(|grant| grant.key.clone())
            .collect::<Vec<_>>(),
        vec![key("reports:view")]
    );

    let events = store.recorded_events().await;
    let update_event = events
        .iter()
        .find(|event| event.action == AuditAction::CustomRoleUpdated);
    assert!(update_event.is_some_and(|event| event.before.is_some() && event.after.is_some()));
}

#[tokio::test]
async fn system_roles_are_immutable() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::SuperAdmin).await;
    let service = service(&store);

    let update = service
        .update_custom_role(tenant_id, &actor, "ADMIN", CustomRolePatch::default())
        .await;
    assert!(matches!(update, Err(AppError::SystemRoleImmutable(_))));

    let delete = service
        .delete_custom_role(tenant_id, &actor, "employee", true)
        .await;
    assert!(matches!(delete, Err(AppError::SystemRoleImmutable(_))));
}

#[tokio::test]
async fn delete_in_use_role_requires_force_and_then_cascades() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;
    let service = service(&store);
    let created = service
        .create_custom_role(tenant_id, &actor, input("Mentor", &["trainings:view"]))
        .await;
    let Ok(definition) = created else {
        panic!("custom role should be created");
    };
    let role_id = definition.role.role_id;

    let holder = store.add_principal(tenant_id).await;
    let assignment_id = store
        .insert_assignment(tenant_id, holder, RoleRef::Custom(role_id))
        .await;

    let blocked = service
        .delete_custom_role(tenant_id, &actor, "Mentor", false)
        .await;
    assert!(matches!(blocked, Err(AppError::RoleInUse { count: 1, .. })));
    assert_eq!(store.active_assignments(holder).await.len(), 1);

    let forced = service
        .delete_custom_role(tenant_id, &actor, "Mentor", true)
        .await;
    assert_eq!(
        forced.ok().map(|result| result.cascaded_assignments),
        Some(1)
    );

    assert!(store.active_assignments(holder).await.is_empty());
    let state = store.state.lock().await;
    assert!(!state.custom_grants.contains_key(&role_id));
    assert!(!state.overlays.contains_key(&assignment_id));
    assert!(
        state
            .custom_roles
            .iter()
            .all(|role| role.deleted_at.is_some())
    );
}

#[tokio::test]
async fn find_by_identifier_matches_id_name_then_derived_identifier() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;
    let service = service(&store);
    let created = service
        .create_custom_role(tenant_id, &actor, input("Field Auditor", &["audit:view"]))
        .await;
    let Ok(definition) = created else {
        panic!("custom role should be created");
    };
    let role_id = definition.role.role_id.to_string();

    for identifier in [role_id.as_str(), "Field Auditor", "FIELD_AUDITOR", "field auditor"] {
        let update = service
            .update_custom_role(
                tenant_id,
                &actor,
                identifier,
                CustomRolePatch {
                    is_active: Some(true),
                    ..CustomRolePatch::default()
                },
            )
            .await;
        assert!(update.is_ok(), "identifier {identifier} should resolve");
    }

    let missing = service
        .update_custom_role(tenant_id, &actor, "Nobody", CustomRolePatch::default())
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn create_cannot_widen_a_conditional_grant() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let partner = TenantId::new();
    store
        .set_system_grant_records("ADMIN", vec![tenant_scoped_record("users:update", partner)])
        .await;
    let admin = store.add_actor(tenant_id, SystemRole::Admin).await;
    let service = service(&store);

    let unrestricted = service
        .create_custom_role(tenant_id, &admin, input("Escalator", &["users:update"]))
        .await;
    assert!(matches!(unrestricted, Err(AppError::HierarchyViolation(_))));

    let wider_scope = service
        .create_custom_role(
            tenant_id,
            &admin,
            CreateCustomRoleInput {
                grants: vec![GrantInput {
                    scope: Some(PermissionScope::Hierarchy),
                    ..tenant_scoped_input("users:update", partner)
                }],
                ..input("Escalator", &[])
            },
        )
        .await;
    assert!(matches!(wider_scope, Err(AppError::HierarchyViolation(_))));

    let other_tenant = service
        .create_custom_role(
            tenant_id,
            &admin,
            CreateCustomRoleInput {
                grants: vec![tenant_scoped_input("users:update", tenant_id)],
                ..input("Escalator", &[])
            },
        )
        .await;
    assert!(matches!(other_tenant, Err(AppError::HierarchyViolation(_))));
    assert!(store.state.lock().await.custom_roles.is_empty());

    let same_form = service
        .create_custom_role(
            tenant_id,
            &admin,
            CreateCustomRoleInput {
                grants: vec![tenant_scoped_input("users:update", partner)],
                ..input("Partner Editor", &[])
            },
        )
        .await;
    assert!(same_form.is_ok());
}

#[tokio::test]
async fn update_cannot_widen_a_conditional_grant() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let partner = TenantId::new();
    store
        .set_system_grant_records("ADMIN", vec![tenant_scoped_record("users:update", partner)])
        .await;
    let admin = store.add_actor(tenant_id, SystemRole::Admin).await;
    let service = service(&store);
    let created = service
        .create_custom_role(
            tenant_id,
            &admin,
            CreateCustomRoleInput {
                grants: vec![tenant_scoped_input("users:update", partner)],
                ..input("Partner Editor", &[])
            },
        )
        .await;
    let Ok(definition) = created else {
        panic!("custom role should be created");
    };

    let widened = service
        .update_custom_role(
            tenant_id,
            &admin,
            "Partner Editor",
            CustomRolePatch {
                grants: Some(vec![GrantInput::new("users:update")]),
                ..CustomRolePatch::default()
            },
        )
        .await;
    assert!(matches!(widened, Err(AppError::HierarchyViolation(_))));

    let stored = store
        .state
        .lock()
        .await
        .custom_grants
        .get(&definition.role.role_id)
        .cloned()
        .unwrap_or_default();
    assert_eq!(stored, vec![tenant_scoped_record("users:update", partner)]);
}

#[tokio::test]
async fn scheduled_assignments_keep_a_role_in_use() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;
    let service = service(&store);
    let created = service
        .create_custom_role(tenant_id, &actor, input("Mentor", &["trainings:view"]))
        .await;
    let Ok(definition) = created else {
        panic!("custom role should be created");
    };
    let role_id = definition.role.role_id;

    let holder = store.add_principal(tenant_id).await;
    let assignment_id = store
        .insert_assignment(tenant_id, holder, RoleRef::Custom(role_id))
        .await;
    let starts = Utc::now() + Duration::days(7);
    for record in &mut store.state.lock().await.assignments {
        if record.assignment_id == assignment_id {
            record.valid_from = Some(starts);
            record.valid_until = Some(starts + Duration::days(30));
        }
    }

    let blocked = service
        .delete_custom_role(tenant_id, &actor, "Mentor", false)
        .await;
    assert!(matches!(blocked, Err(AppError::RoleInUse { count: 1, .. })));

    let forced = service
        .delete_custom_role(tenant_id, &actor, "Mentor", true)
        .await;
    assert_eq!(
        forced.ok().map(|result| result.cascaded_assignments),
        Some(1)
    );
    assert!(store.active_assignments(holder).await.is_empty());
}

#[tokio::test]
async fn failed_audit_append_does_not_undo_a_committed_create() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;
    store.fail_audit_appends();

    let created = service(&store)
        .create_custom_role(tenant_id, &actor, input("Mentor", &["trainings:view"]))
        .await;
    assert!(created.is_ok());
    assert_eq!(store.state.lock().await.custom_roles.len(), 1);
    assert!(store.recorded_events().await.is_empty());
}
