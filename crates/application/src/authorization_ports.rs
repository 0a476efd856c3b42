mod assignments;
mod audit;
mod records;
mod repositories;
mod roles;

pub use assignments::{
    AdvancedPermissionInput, AssignmentResult, BulkAssignmentFailure, BulkAssignmentResult,
    RemovalResult,
};
pub use audit::{AuditEvent, AuditRepository};
pub(crate) use audit::record_committed_event;
pub use records::{
    AssignmentRecord, CatalogRecord, CustomRoleUpdate, GrantRecord, NewAssignment,
    NewCustomRole, OverlayRecord, PrincipalRecord,
};
pub use repositories::{AuthorizationRepository, SecurityAdminRepository};
pub use roles::{
    CreateCustomRoleInput, CustomRoleDefinition, CustomRolePatch, DeletionResult, GrantInput,
    RoleSummary,
};
