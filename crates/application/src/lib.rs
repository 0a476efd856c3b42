//! Authorization services and persistence ports.

#![forbid(unsafe_code)]

mod access_control_service;
mod authorization_ports;
mod custom_role_service;
mod permission_ingest;
mod permission_resolver;
mod role_assignment_service;
mod role_hierarchy_service;

#[cfg(test)]
mod test_support;

pub use access_control_service::AccessControlService;
pub use authorization_ports::{
    AdvancedPermissionInput, AssignmentRecord, AssignmentResult, AuditEvent, AuditRepository,
    AuthorizationRepository, BulkAssignmentFailure, BulkAssignmentResult, CatalogRecord,
    CreateCustomRoleInput, CustomRoleDefinition, CustomRolePatch, CustomRoleUpdate,
    DeletionResult, GrantInput, GrantRecord, NewAssignment, NewCustomRole, OverlayRecord,
    PrincipalRecord, RemovalResult, RoleSummary, SecurityAdminRepository,
};
pub use custom_role_service::CustomRoleService;
pub use permission_resolver::EffectivePermissionResolver;
pub use role_assignment_service::RoleAssignmentService;
pub use role_hierarchy_service::RoleHierarchyService;
