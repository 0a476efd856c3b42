use std::str::FromStr;

use rolegate_core::AppError;
use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by authorization mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a custom role is created.
    CustomRoleCreated,
    /// Emitted when a custom role is edited or its grants are replaced.
    CustomRoleUpdated,
    /// Emitted when a custom role is soft-deleted.
    CustomRoleDeleted,
    /// Emitted when a custom role is re-levelled.
    CustomRoleMoved,
    /// Emitted when a role is assigned to a principal.
    RoleAssigned,
    /// Emitted when a role is removed from a principal.
    RoleUnassigned,
    /// Emitted once per bulk assignment request.
    RolesBulkAssigned,
    /// Emitted when assignment overlays are replaced.
    AdvancedPermissionsReplaced,
    /// Emitted when a permission is granted directly to a principal.
    DirectGrantCreated,
    /// Emitted when a direct grant is revoked.
    DirectGrantRevoked,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomRoleCreated => "security.custom_role.created",
            Self::CustomRoleUpdated => "security.custom_role.updated",
            Self::CustomRoleDeleted => "security.custom_role.deleted",
            Self::CustomRoleMoved => "security.custom_role.moved",
            Self::RoleAssigned => "security.role.assigned",
            Self::RoleUnassigned => "security.role.unassigned",
            Self::RolesBulkAssigned => "security.role.bulk_assigned",
            Self::AdvancedPermissionsReplaced => "security.advanced_permissions.replaced",
            Self::DirectGrantCreated => "security.direct_grant.created",
            Self::DirectGrantRevoked => "security.direct_grant.revoked",
        }
    }

    /// Returns every audit action.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AuditAction] = &[
            AuditAction::CustomRoleCreated,
            AuditAction::CustomRoleUpdated,
            AuditAction::CustomRoleDeleted,
            AuditAction::CustomRoleMoved,
            AuditAction::RoleAssigned,
            AuditAction::RoleUnassigned,
            AuditAction::RolesBulkAssigned,
            AuditAction::AdvancedPermissionsReplaced,
            AuditAction::DirectGrantCreated,
            AuditAction::DirectGrantRevoked,
        ];

        ALL
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown audit action '{value}'")))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::AuditAction;

    #[test]
    fn audit_action_roundtrip_storage_value() {
        let action = AuditAction::CustomRoleDeleted;
        let restored = AuditAction::from_str(action.as_str());
        assert!(restored.is_ok());
        assert_eq!(restored.unwrap_or(AuditAction::RoleAssigned), action);
    }

    #[test]
    fn unknown_audit_action_is_rejected() {
        assert!(AuditAction::from_str("security.role.exploded").is_err());
    }
}
