//! Privilege ordering over system and custom roles.
//!
//! Every check here is pure: callers load the standings they need and get a
//! typed denial back instead of an error.

use std::fmt::{Display, Formatter};

use rolegate_core::{AppError, PrincipalId, TenantId};

use crate::role::{CustomRole, HierarchyLevel, SystemRole};

/// Best active privilege of one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    /// Principal the standing belongs to.
    pub principal_id: PrincipalId,
    /// Tenant the principal belongs to.
    pub tenant_id: TenantId,
    /// Most privileged level across active assignments, if any.
    pub best_level: Option<HierarchyLevel>,
}

impl Standing {
    /// Returns whether the principal holds the top level.
    #[must_use]
    pub fn bypasses_tenant_isolation(&self) -> bool {
        self.best_level == Some(HierarchyLevel::TOP)
    }

    /// Returns whether the principal may operate inside `tenant_id`.
    #[must_use]
    pub fn can_reach_tenant(&self, tenant_id: TenantId) -> bool {
        self.tenant_id == tenant_id || self.bypasses_tenant_isolation()
    }
}

/// Reason a hierarchy check denied an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyDenial {
    /// Actor holds no active role.
    NoActiveRole,
    /// Role is more privileged than the actor's best role.
    RoleAboveActor {
        /// Actor's best level.
        actor_level: HierarchyLevel,
        /// Level of the requested role.
        role_level: HierarchyLevel,
    },
    /// Target principal is more privileged than the actor.
    TargetAboveActor {
        /// Actor's best level.
        actor_level: HierarchyLevel,
        /// Target's best level.
        target_level: HierarchyLevel,
    },
    /// Actor and target live in different tenants and the actor cannot bypass isolation.
    TenantMismatch,
    /// Actor is below the level required to administer roles.
    BelowManagementFloor {
        /// Actor's best level.
        actor_level: HierarchyLevel,
        /// Required level.
        floor: HierarchyLevel,
    },
    /// Requested custom role level is above the tenant baseline.
    AboveBaseline {
        /// Requested level.
        requested: HierarchyLevel,
        /// Baseline level.
        baseline: HierarchyLevel,
    },
}

impl Display for HierarchyDenial {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveRole => write!(formatter, "actor holds no active role"),
            Self::RoleAboveActor {
                actor_level,
                role_level,
            } => write!(
                formatter,
                "role level {role_level} is more privileged than actor level {actor_level}"
            ),
            Self::TargetAboveActor {
                actor_level,
                target_level,
            } => write!(
                formatter,
                "target level {target_level} is more privileged than actor level {actor_level}"
            ),
            Self::TenantMismatch => write!(formatter, "target belongs to another tenant"),
            Self::BelowManagementFloor { actor_level, floor } => write!(
                formatter,
                "actor level {actor_level} is below the role management level {floor}"
            ),
            Self::AboveBaseline {
                requested,
                baseline,
            } => write!(
                formatter,
                "custom role level {requested} would rank above the baseline level {baseline}"
            ),
        }
    }
}

impl From<HierarchyDenial> for AppError {
    fn from(value: HierarchyDenial) -> Self {
        match value {
            HierarchyDenial::TenantMismatch => {
                AppError::NotFound("principal was not found in tenant".to_owned())
            }
            denial => AppError::HierarchyViolation(denial.to_string()),
        }
    }
}

/// Immutable hierarchy configuration shared by all services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleHierarchy {
    custom_role_baseline: SystemRole,
    management_floor: SystemRole,
}

impl Default for RoleHierarchy {
    fn default() -> Self {
        Self {
            custom_role_baseline: SystemRole::Manager,
            management_floor: SystemRole::Admin,
        }
    }
}

impl RoleHierarchy {
    /// Creates a hierarchy with explicit baseline and management floor.
    #[must_use]
    pub fn new(custom_role_baseline: SystemRole, management_floor: SystemRole) -> Self {
        Self {
            custom_role_baseline,
            management_floor,
        }
    }

    /// Returns the default baseline used when a tenant designates none.
    #[must_use]
    pub fn default_custom_role_baseline(&self) -> SystemRole {
        self.custom_role_baseline
    }

    /// Returns the least privileged system role allowed to administer roles.
    #[must_use]
    pub fn management_floor(&self) -> SystemRole {
        self.management_floor
    }

    /// Returns the level custom roles are clamped to in a tenant.
    #[must_use]
    pub fn baseline_level(&self, tenant_baseline: Option<SystemRole>) -> HierarchyLevel {
        tenant_baseline.unwrap_or(self.custom_role_baseline).level()
    }

    /// Returns a custom role's effective level: its stored level, never above the baseline.
    #[must_use]
    pub fn custom_role_level(
        &self,
        role: &CustomRole,
        tenant_baseline: Option<SystemRole>,
    ) -> HierarchyLevel {
        let baseline = self.baseline_level(tenant_baseline);
        role.level.map_or(baseline, |level| level.max(baseline))
    }

    /// Checks whether `actor` may give a role at `role_level` to `target`.
    pub fn check_assignment(
        &self,
        actor: &Standing,
        target: &Standing,
        role_level: HierarchyLevel,
    ) -> Result<(), HierarchyDenial> {
        self.check_target(actor, target)?;

        let actor_level = actor.best_level.ok_or(HierarchyDenial::NoActiveRole)?;
        if !actor_level.outranks_or_equals(role_level) {
            return Err(HierarchyDenial::RoleAboveActor {
                actor_level,
                role_level,
            });
        }

        Ok(())
    }

    /// Checks whether `actor` may change the access of `target` at all.
    pub fn check_target(&self, actor: &Standing, target: &Standing) -> Result<(), HierarchyDenial> {
        let actor_level = actor.best_level.ok_or(HierarchyDenial::NoActiveRole)?;

        if !actor.can_reach_tenant(target.tenant_id) {
            return Err(HierarchyDenial::TenantMismatch);
        }

        if let Some(target_level) = target.best_level
            && !actor_level.outranks_or_equals(target_level)
        {
            return Err(HierarchyDenial::TargetAboveActor {
                actor_level,
                target_level,
            });
        }

        Ok(())
    }

    /// Boolean form of [`RoleHierarchy::check_assignment`].
    #[must_use]
    pub fn can_assign(
        &self,
        actor: &Standing,
        target: &Standing,
        role_level: HierarchyLevel,
    ) -> bool {
        self.check_assignment(actor, target, role_level).is_ok()
    }

    /// Returns whether a role at `role_level` is assignable by `actor` to an unspecified target.
    #[must_use]
    pub fn is_assignable_by(&self, actor: &Standing, role_level: HierarchyLevel) -> bool {
        actor
            .best_level
            .is_some_and(|actor_level| actor_level.outranks_or_equals(role_level))
    }

    /// Returns whether a role at `role_level` appears in the actor's listings.
    #[must_use]
    pub fn is_visible_to(&self, actor: &Standing, role_level: HierarchyLevel) -> bool {
        self.is_assignable_by(actor, role_level)
    }

    /// Checks that `actor` may create, edit or delete tenant roles.
    pub fn check_role_management(&self, actor: &Standing) -> Result<(), HierarchyDenial> {
        let actor_level = actor.best_level.ok_or(HierarchyDenial::NoActiveRole)?;
        let floor = self.management_floor.level();
        if !actor_level.outranks_or_equals(floor) {
            return Err(HierarchyDenial::BelowManagementFloor { actor_level, floor });
        }

        Ok(())
    }

    /// Checks that `actor` may administer one custom role currently at `role_level`.
    pub fn check_custom_role_management(
        &self,
        actor: &Standing,
        role_level: HierarchyLevel,
    ) -> Result<(), HierarchyDenial> {
        self.check_role_management(actor)?;
        let actor_level = actor.best_level.ok_or(HierarchyDenial::NoActiveRole)?;
        if !actor_level.outranks_or_equals(role_level) {
            return Err(HierarchyDenial::RoleAboveActor {
                actor_level,
                role_level,
            });
        }

        Ok(())
    }

    /// Checks a custom role re-level from `current_level` to `new_level`.
    pub fn check_move(
        &self,
        actor: &Standing,
        current_level: HierarchyLevel,
        new_level: HierarchyLevel,
        tenant_baseline: Option<SystemRole>,
    ) -> Result<(), HierarchyDenial> {
        self.check_custom_role_management(actor, current_level)?;

        let actor_level = actor.best_level.ok_or(HierarchyDenial::NoActiveRole)?;
        if !actor_level.outranks_or_equals(new_level) {
            return Err(HierarchyDenial::RoleAboveActor {
                actor_level,
                role_level: new_level,
            });
        }

        let baseline = self.baseline_level(tenant_baseline);
        if !baseline.outranks_or_equals(new_level) {
            return Err(HierarchyDenial::AboveBaseline {
                requested: new_level,
                baseline,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;
    use rolegate_core::{AppError, PrincipalId, TenantId};

    use super::{HierarchyDenial, RoleHierarchy, Standing};
    use crate::role::{CustomRole, CustomRoleId, HierarchyLevel, SystemRole};

    fn standing(tenant_id: TenantId, role: Option<SystemRole>) -> Standing {
        Standing {
            principal_id: PrincipalId::new(),
            tenant_id,
            best_level: role.map(|value| value.level()),
        }
    }

    fn custom_role(tenant_id: TenantId, level: Option<u16>) -> CustomRole {
        CustomRole {
            role_id: CustomRoleId::new(),
            tenant_id,
            name: "Field Auditor".to_owned(),
            description: None,
            level: level.map(HierarchyLevel::new),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn admin_cannot_assign_super_admin() {
        let hierarchy = RoleHierarchy::default();
        let tenant_id = TenantId::new();
        let actor = standing(tenant_id, Some(SystemRole::Admin));
        let target = standing(tenant_id, None);

        let result = hierarchy.check_assignment(&actor, &target, SystemRole::SuperAdmin.level());
        assert!(matches!(result, Err(HierarchyDenial::RoleAboveActor { .. })));
        assert!(hierarchy.can_assign(&actor, &target, SystemRole::Employee.level()));
    }

    #[test]
    fn actor_cannot_modify_more_privileged_target() {
        let hierarchy = RoleHierarchy::default();
        let tenant_id = TenantId::new();
        let actor = standing(tenant_id, Some(SystemRole::Manager));
        let target = standing(tenant_id, Some(SystemRole::Admin));

        let result = hierarchy.check_assignment(&actor, &target, SystemRole::Employee.level());
        assert!(matches!(
            result,
            Err(HierarchyDenial::TargetAboveActor { .. })
        ));
    }

    #[test]
    fn cross_tenant_assignment_needs_top_level() {
        let hierarchy = RoleHierarchy::default();
        let actor = standing(TenantId::new(), Some(SystemRole::Admin));
        let target = standing(TenantId::new(), None);
        let denial = hierarchy.check_assignment(&actor, &target, SystemRole::Employee.level());
        assert_eq!(denial, Err(HierarchyDenial::TenantMismatch));
        assert!(matches!(
            denial.map_err(AppError::from),
            Err(AppError::NotFound(_))
        ));

        let operator = standing(TenantId::new(), Some(SystemRole::SuperAdmin));
        assert!(hierarchy.can_assign(&operator, &target, SystemRole::Admin.level()));
    }

    #[test]
    fn actor_without_roles_cannot_assign() {
        let hierarchy = RoleHierarchy::default();
        let tenant_id = TenantId::new();
        let actor = standing(tenant_id, None);
        let target = standing(tenant_id, None);
        assert_eq!(
            hierarchy.check_assignment(&actor, &target, SystemRole::Guest.level()),
            Err(HierarchyDenial::NoActiveRole)
        );
    }

    #[test]
    fn custom_role_level_is_clamped_to_baseline() {
        let hierarchy = RoleHierarchy::default();
        let tenant_id = TenantId::new();

        let unset = custom_role(tenant_id, None);
        assert_eq!(
            hierarchy.custom_role_level(&unset, None),
            SystemRole::Manager.level()
        );

        let ambitious = custom_role(tenant_id, Some(5));
        assert_eq!(
            hierarchy.custom_role_level(&ambitious, None),
            SystemRole::Manager.level()
        );

        let modest = custom_role(tenant_id, Some(45));
        assert_eq!(
            hierarchy.custom_role_level(&modest, Some(SystemRole::Trainer)),
            HierarchyLevel::new(45)
        );
        assert_eq!(
            hierarchy.custom_role_level(&modest, Some(SystemRole::Employee)),
            SystemRole::Employee.level()
        );
    }

    #[test]
    fn move_rejects_levels_above_baseline_or_actor() {
        let hierarchy = RoleHierarchy::default();
        let tenant_id = TenantId::new();
        let admin = standing(tenant_id, Some(SystemRole::Admin));

        assert!(
            hierarchy
                .check_move(&admin, HierarchyLevel::new(30), HierarchyLevel::new(45), None)
                .is_ok()
        );
        assert!(matches!(
            hierarchy.check_move(&admin, HierarchyLevel::new(30), HierarchyLevel::new(20), None),
            Err(HierarchyDenial::AboveBaseline { .. })
        ));

        let loose = RoleHierarchy::new(SystemRole::Admin, SystemRole::Admin);
        assert!(matches!(
            loose.check_move(&admin, HierarchyLevel::new(30), HierarchyLevel::new(5), None),
            Err(HierarchyDenial::RoleAboveActor { .. })
        ));
    }

    #[test]
    fn role_management_requires_floor() {
        let hierarchy = RoleHierarchy::default();
        let tenant_id = TenantId::new();
        assert!(
            hierarchy
                .check_role_management(&standing(tenant_id, Some(SystemRole::Admin)))
                .is_ok()
        );
        assert!(matches!(
            hierarchy.check_role_management(&standing(tenant_id, Some(SystemRole::Manager))),
            Err(HierarchyDenial::BelowManagementFloor { .. })
        ));
    }

    proptest! {
        #[test]
        fn no_actor_can_assign_a_more_privileged_role(
            actor_level in 0_u16..100,
            role_level in 0_u16..100,
            target_level in proptest::option::of(0_u16..100),
        ) {
            let hierarchy = RoleHierarchy::default();
            let tenant_id = TenantId::new();
            let actor = Standing {
                principal_id: PrincipalId::new(),
                tenant_id,
                best_level: Some(HierarchyLevel::new(actor_level)),
            };
            let target = Standing {
                principal_id: PrincipalId::new(),
                tenant_id,
                best_level: target_level.map(HierarchyLevel::new),
            };

            let allowed = hierarchy.can_assign(&actor, &target, HierarchyLevel::new(role_level));
            if role_level < actor_level {
                prop_assert!(!allowed);
            }
            if let Some(target_level) = target_level
                && target_level < actor_level
            {
                prop_assert!(!allowed);
            }
        }
    }
}
