use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rolegate_core::{AppError, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Privilege rank. Lower values are more privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HierarchyLevel(u16);

impl HierarchyLevel {
    /// The most privileged level. Holders bypass tenant isolation.
    pub const TOP: Self = Self(0);

    /// Creates a level from its numeric rank.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Returns the numeric rank.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Returns whether `self` is at least as privileged as `other`.
    #[must_use]
    pub fn outranks_or_equals(self, other: Self) -> bool {
        self.0 <= other.0
    }
}

impl Display for HierarchyLevel {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Fixed, compile-time system roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemRole {
    /// Platform operator with cross-tenant reach.
    SuperAdmin,
    /// Tenant administrator.
    Admin,
    /// Human-resources manager.
    HrManager,
    /// Line manager.
    Manager,
    /// Trainer delivering courses.
    Trainer,
    /// Regular employee.
    Employee,
    /// Read-only guest.
    Guest,
}

impl SystemRole {
    /// Returns every system role, most privileged first.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[SystemRole] = &[
            SystemRole::SuperAdmin,
            SystemRole::Admin,
            SystemRole::HrManager,
            SystemRole::Manager,
            SystemRole::Trainer,
            SystemRole::Employee,
            SystemRole::Guest,
        ];

        ALL
    }

    /// Returns the stable storage identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::Admin => "ADMIN",
            Self::HrManager => "HR_MANAGER",
            Self::Manager => "MANAGER",
            Self::Trainer => "TRAINER",
            Self::Employee => "EMPLOYEE",
            Self::Guest => "GUEST",
        }
    }

    /// Returns the display name used in role listings.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Admin",
            Self::Admin => "Admin",
            Self::HrManager => "HR Manager",
            Self::Manager => "Manager",
            Self::Trainer => "Trainer",
            Self::Employee => "Employee",
            Self::Guest => "Guest",
        }
    }

    /// Returns the fixed privilege level.
    #[must_use]
    pub const fn level(&self) -> HierarchyLevel {
        match self {
            Self::SuperAdmin => HierarchyLevel::new(0),
            Self::Admin => HierarchyLevel::new(10),
            Self::HrManager => HierarchyLevel::new(20),
            Self::Manager => HierarchyLevel::new(30),
            Self::Trainer => HierarchyLevel::new(40),
            Self::Employee => HierarchyLevel::new(50),
            Self::Guest => HierarchyLevel::new(60),
        }
    }
}

impl Display for SystemRole {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for SystemRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = derive_role_identifier(value);
        Self::all()
            .iter()
            .copied()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| AppError::NotFound(format!("unknown system role '{value}'")))
    }
}

/// Identifier of a tenant custom role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomRoleId(Uuid);

impl CustomRoleId {
    /// Creates a random custom role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID value.
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

impl Default for CustomRoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CustomRoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Reference to exactly one role, system or custom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RoleRef {
    /// Fixed system role.
    System(SystemRole),
    /// Tenant custom role.
    Custom(CustomRoleId),
}

impl RoleRef {
    /// Returns the system role, when this references one.
    #[must_use]
    pub fn as_system(&self) -> Option<SystemRole> {
        match self {
            Self::System(role) => Some(*role),
            Self::Custom(_) => None,
        }
    }

    /// Returns the custom role id, when this references one.
    #[must_use]
    pub fn as_custom(&self) -> Option<CustomRoleId> {
        match self {
            Self::System(_) => None,
            Self::Custom(role_id) => Some(*role_id),
        }
    }
}

impl Display for RoleRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System(role) => write!(formatter, "{role}"),
            Self::Custom(role_id) => write!(formatter, "custom:{role_id}"),
        }
    }
}

/// Tenant-defined mutable role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRole {
    /// Stable identifier.
    pub role_id: CustomRoleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Name, unique per tenant among non-deleted roles.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Stored level; clamped to the tenant baseline when resolved.
    pub level: Option<HierarchyLevel>,
    /// Inactive roles are kept but never resolved or assigned.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CustomRole {
    /// Returns whether the role has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns whether the role participates in resolution and assignment.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.is_active && !self.is_deleted()
    }

    /// Returns the derived identifier used by callers that only know a role-type string.
    #[must_use]
    pub fn derived_identifier(&self) -> String {
        derive_role_identifier(self.name.as_str())
    }
}

/// Derives the legacy role-type identifier from a display name.
#[must_use]
pub fn derive_role_identifier(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}
