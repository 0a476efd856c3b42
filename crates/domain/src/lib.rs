//! Authorization entities and pure hierarchy and merge rules.

#![forbid(unsafe_code)]

mod assignment;
mod catalog;
mod effective;
mod grant;
mod hierarchy;
mod permission;
mod role;
mod security;

pub use assignment::{Assignment, AssignmentId};
pub use catalog::{PermissionCatalog, builtin_definitions, builtin_system_role_grants};
pub use effective::{AccessContext, EffectivePermission, PermissionMap};
pub use grant::{AdvancedPermission, GrantConditions, PermissionGrant, PermissionScope};
pub use hierarchy::{HierarchyDenial, RoleHierarchy, Standing};
pub use permission::{PermissionDefinition, PermissionKey};
pub use role::{
    CustomRole, CustomRoleId, HierarchyLevel, RoleRef, SystemRole, derive_role_identifier,
};
pub use security::AuditAction;
