//! Shared primitives for all Rust crates in Rolegate.

#![forbid(unsafe_code)]

/// Authentication primitives handed over by the identity layer.
pub mod auth;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use auth::{ActorContext, PrincipalId};

/// Result type used across Rolegate crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string. Surrounding whitespace is trimmed.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Tenant identifier used as the partition key for every persisted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Creates a random tenant identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a tenant identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TenantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Authorization error kinds.
///
/// Every variant except [`AppError::StorageFailure`] is an expected outcome
/// that callers branch on. Storage failures are the only fatal kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Invalid input that is not tied to a permission key.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced principal, role or permission does not exist in the caller's tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// A custom role with the same name already exists in the tenant.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// The principal already holds an active assignment for the role.
    #[error("already assigned: {0}")]
    AlreadyAssigned(String),

    /// No active assignment matches the removal request.
    #[error("not assigned: {0}")]
    NotAssigned(String),

    /// Actor attempted to act beyond their own privilege level.
    #[error("hierarchy violation: {0}")]
    HierarchyViolation(String),

    /// Role deletion is blocked by active assignments.
    #[error("role '{role_id}' is still referenced by {count} active assignment(s)")]
    RoleInUse {
        /// Identifier of the blocked role.
        role_id: String,
        /// Number of active assignments referencing the role.
        count: u64,
    },

    /// A grant references an unknown or inactive catalog permission.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Every supplied permission identifier failed to parse.
    #[error("malformed permission key: {0}")]
    MalformedPermissionKey(String),

    /// System roles cannot be created, edited or deleted.
    #[error("system role is immutable: {0}")]
    SystemRoleImmutable(String),

    /// Persistence collaborator failed.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl AppError {
    /// Returns a stable machine-readable code for boundary mapping.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::DuplicateName(_) => "duplicate_name",
            Self::AlreadyAssigned(_) => "already_assigned",
            Self::NotAssigned(_) => "not_assigned",
            Self::HierarchyViolation(_) => "hierarchy_violation",
            Self::RoleInUse { .. } => "role_in_use",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::MalformedPermissionKey(_) => "malformed_permission_key",
            Self::SystemRoleImmutable(_) => "system_role_immutable",
            Self::StorageFailure(_) => "storage_failure",
        }
    }

    /// Returns whether the error is an unexpected failure rather than a typed outcome.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString, TenantId};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn non_empty_string_trims_value() {
        let value = NonEmptyString::new("  Field Auditor ");
        assert_eq!(
            value.map(String::from).unwrap_or_default(),
            "Field Auditor"
        );
    }

    #[test]
    fn tenant_id_formats_as_uuid() {
        let tenant_id = TenantId::new();
        assert_eq!(tenant_id.to_string().len(), 36);
    }

    #[test]
    fn only_storage_failures_are_fatal() {
        assert!(AppError::StorageFailure("connection reset".to_owned()).is_fatal());
        assert!(!AppError::HierarchyViolation("above actor".to_owned()).is_fatal());
        assert!(
            !AppError::RoleInUse {
                role_id: "r".to_owned(),
                count: 2
            }
            .is_fatal()
        );
    }

    #[test]
    fn role_in_use_reports_count() {
        let error = AppError::RoleInUse {
            role_id: "auditors".to_owned(),
            count: 3,
        };
        assert_eq!(error.code(), "role_in_use");
        assert!(error.to_string().contains("3 active assignment"));
    }
}
