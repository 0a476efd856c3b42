use std::sync::Arc;

use chrono::Utc;
use rolegate_core::{ActorContext, AppError, TenantId};
use rolegate_domain::{
    AuditAction, CustomRole, CustomRoleId, HierarchyLevel, RoleHierarchy, RoleRef, SystemRole,
};

use crate::RoleHierarchyService;
use crate::test_support::FakeStore;

fn hierarchy_service(store: &Arc<FakeStore>) -> RoleHierarchyService {
    RoleHierarchyService::new(
        RoleHierarchy::default(),
        store.clone(),
        store.clone(),
        store.clone(),
    )
}

fn custom_role(tenant_id: TenantId, name: &str, level: Option<u16>, active: bool) -> CustomRole {
    CustomRole {
        role_id: CustomRoleId::new(),
        tenant_id,
        name: name.to_owned(),
        description: None,
        level: level.map(HierarchyLevel::new),
        is_active: active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

#[tokio::test]
async fn standing_uses_most_privileged_active_role() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Employee).await;
    store
        .insert_assignment(
            tenant_id,
            actor.principal_id(),
            RoleRef::System(SystemRole::HrManager),
        )
        .await;

    let standing = hierarchy_service(&store).actor_standing(&actor).await;
    assert_eq!(
        standing.ok().and_then(|standing| standing.best_level),
        Some(SystemRole::HrManager.level())
    );
}

#[tokio::test]
async fn actor_context_with_wrong_tenant_is_not_found() {
    let store = FakeStore::seeded();
    let actor = store.add_actor(TenantId::new(), SystemRole::Admin).await;
    let forged = ActorContext::new(actor.principal_id(), TenantId::new());

    let result = hierarchy_service(&store).actor_standing(&forged).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn custom_role_level_respects_tenant_baseline() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let ambitious = custom_role(tenant_id, "Deputy", Some(5), true);
    let role_id = ambitious.role_id;
    {
        let mut state = store.state.lock().await;
        state.custom_roles.push(ambitious);
        state.baselines.insert(tenant_id, "TRAINER".to_owned());
    }

    let level = hierarchy_service(&store)
        .level_of(tenant_id, RoleRef::Custom(role_id))
        .await;
    assert_eq!(level.ok(), Some(SystemRole::Trainer.level()));
}

#[tokio::test]
async fn can_assign_follows_hierarchy() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Manager).await;
    let target = store.add_principal(tenant_id).await;
    let service = hierarchy_service(&store);

    let employee = service
        .can_assign(
            &actor,
            tenant_id,
            target,
            RoleRef::System(SystemRole::Employee),
        )
        .await;
    assert_eq!(employee.ok(), Some(true));

    let admin = service
        .can_assign(&actor, tenant_id, target, RoleRef::System(SystemRole::Admin))
        .await;
    assert_eq!(admin.ok(), Some(false));

    let elsewhere = service
        .can_assign(
            &actor,
            TenantId::new(),
            target,
            RoleRef::System(SystemRole::Employee),
        )
        .await;
    assert!(matches!(elsewhere, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn assignable_roles_exclude_inactive_and_more_privileged_roles() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Manager).await;
    {
        let mut state = store.state.lock().await;
        state
            .custom_roles
            .push(custom_role(tenant_id, "Mentor", Some(45), true));
        state
            .custom_roles
            .push(custom_role(tenant_id, "Retired", Some(45), false));
    }

    let roles = hierarchy_service(&store)
        .assignable_roles(&actor, tenant_id)
        .await
        .unwrap_or_default();
    let identifiers = roles
        .iter()
        .map(|role| role.identifier.as_str())
        .collect::<Vec<_>>();

    assert_eq!(
        identifiers,
        vec!["MANAGER", "TRAINER", "MENTOR", "EMPLOYEE", "GUEST"]
    );
}

#[tokio::test]
async fn visible_roles_are_paginated_with_total() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;
    {
        let mut state = store.state.lock().await;
        state
            .custom_roles
            .push(custom_role(tenant_id, "Retired", Some(45), false));
        let mut deleted = custom_role(tenant_id, "Gone", Some(45), false);
        deleted.deleted_at = Some(Utc::now());
        state.custom_roles.push(deleted);
    }
    let service = hierarchy_service(&store);

    let first = service.visible_roles(&actor, tenant_id, 1, 4).await;
    let (items, total) = first.unwrap_or_default();
    assert_eq!(total, 7);
    assert_eq!(items.len(), 4);
    assert_eq!(
        items.first().map(|role| role.identifier.clone()),
        Some("ADMIN".to_owned())
    );

    let (last_page, _) = service
        .visible_roles(&actor, tenant_id, 2, 4)
        .await
        .unwrap_or_default();
    assert_eq!(last_page.len(), 3);
    assert!(last_page.iter().any(|role| role.name == "Retired"));

    let invalid = service.visible_roles(&actor, tenant_id, 0, 4).await;
    assert!(matches!(invalid, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn move_rejects_levels_above_actor_or_baseline() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Admin).await;
    let role = custom_role(tenant_id, "Mentor", Some(45), true);
    let role_id = role.role_id;
    store.state.lock().await.custom_roles.push(role);
    let service = hierarchy_service(&store);

    let above_baseline = service
        .move_custom_role(&actor, tenant_id, role_id, HierarchyLevel::new(15))
        .await;
    assert!(matches!(
        above_baseline,
        Err(AppError::HierarchyViolation(_))
    ));

    let moved = service
        .move_custom_role(&actor, tenant_id, role_id, HierarchyLevel::new(35))
        .await;
    assert_eq!(
        moved.ok().and_then(|role| role.level),
        Some(HierarchyLevel::new(35))
    );

    let events = store.recorded_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(
        events.first().map(|event| event.action),
        Some(AuditAction::CustomRoleMoved)
    );
    assert!(events.first().is_some_and(|event| event.before.is_some()));
}

#[tokio::test]
async fn move_by_non_manager_is_rejected() {
    let store = FakeStore::seeded();
    let tenant_id = TenantId::new();
    let actor = store.add_actor(tenant_id, SystemRole::Manager).await;
    let role = custom_role(tenant_id, "Mentor", Some(45), true);
    let role_id = role.role_id;
    store.state.lock().await.custom_roles.push(role);

    let result = hierarchy_service(&store)
        .move_custom_role(&actor, tenant_id, role_id, HierarchyLevel::new(50))
        .await;
    assert!(matches!(result, Err(AppError::HierarchyViolation(_))));
}
