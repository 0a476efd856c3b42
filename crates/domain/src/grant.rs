use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rolegate_core::{AppError, TenantId};
use serde::{Deserialize, Serialize};

use crate::permission::PermissionKey;
use crate::role::HierarchyLevel;

/// Reach of a granted permission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    /// Unrestricted; the default for plain role grants.
    #[default]
    All,
    /// Platform-wide.
    Global,
    /// Limited to principals at or below the holder in the role hierarchy.
    Hierarchy,
    /// Limited to specific tenants.
    Tenant,
}

impl PermissionScope {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Global => "global",
            Self::Hierarchy => "hierarchy",
            Self::Tenant => "tenant",
        }
    }

    /// Returns the precedence used when sources disagree: higher is narrower.
    #[must_use]
    pub fn narrowness(&self) -> u8 {
        match self {
            Self::All | Self::Global => 0,
            Self::Hierarchy => 1,
            Self::Tenant => 2,
        }
    }
}

impl Display for PermissionScope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for PermissionScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "global" => Ok(Self::Global),
            "hierarchy" => Ok(Self::Hierarchy),
            "tenant" | "tenant-specific" | "tenant_specific" => Ok(Self::Tenant),
            _ => Err(AppError::Validation(format!(
                "unknown permission scope '{value}'"
            ))),
        }
    }
}

/// Conditions attached to a grant or overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantConditions {
    /// Most privileged level the holder may act upon; more privileged targets are out of reach.
    pub max_role_level: Option<HierarchyLevel>,
    /// Tenants the grant applies to. Empty means no tenant restriction.
    pub allowed_tenants: BTreeSet<TenantId>,
}

impl GrantConditions {
    /// Returns whether no condition is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_role_level.is_none() && self.allowed_tenants.is_empty()
    }

    /// Combines conditions of two granting sources that share a scope.
    ///
    /// Either source granting is enough, so the result is the looser of the
    /// two: an unrestricted side keeps that condition unrestricted, tenant
    /// lists are unioned and the more privileged level cap wins.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        let max_role_level = match (self.max_role_level, other.max_role_level) {
            (Some(left), Some(right)) => Some(left.min(right)),
            _ => None,
        };

        let allowed_tenants =
            if self.allowed_tenants.is_empty() || other.allowed_tenants.is_empty() {
                BTreeSet::new()
            } else {
                self.allowed_tenants
                    .union(&other.allowed_tenants)
                    .copied()
                    .collect()
            };

        Self {
            max_role_level,
            allowed_tenants,
        }
    }
}

/// Permission granted to a role or directly to a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Granted key.
    pub key: PermissionKey,
    /// Optional scope; `None` means [`PermissionScope::All`].
    pub scope: Option<PermissionScope>,
    /// Grant conditions.
    pub conditions: GrantConditions,
    /// Visible fields. `None` means every field is visible.
    pub allowed_fields: Option<BTreeSet<String>>,
}

impl PermissionGrant {
    /// Creates an unconditional grant for a key.
    #[must_use]
    pub fn unrestricted(key: PermissionKey) -> Self {
        Self {
            key,
            scope: None,
            conditions: GrantConditions::default(),
            allowed_fields: None,
        }
    }

    /// Returns the form in which this grant applies as a principal-level grant.
    ///
    /// A direct grant without conditions opens the key completely.
    #[must_use]
    pub fn direct_form(&self) -> Self {
        if self.conditions.is_empty() {
            return Self {
                scope: Some(PermissionScope::All),
                ..Self::unrestricted(self.key.clone())
            };
        }

        Self {
            scope: Some(self.scope.unwrap_or_default()),
            ..self.clone()
        }
    }
}

/// Scope- or condition-narrowing overlay attached to one assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedPermission {
    /// Overlaid key.
    pub key: PermissionKey,
    /// Scope that replaces the base grant's scope.
    pub scope: PermissionScope,
    /// Conditions that replace the base grant's conditions.
    pub conditions: GrantConditions,
    /// Field restriction that replaces the base grant's list.
    pub allowed_fields: Option<BTreeSet<String>>,
}

impl AdvancedPermission {
    /// Returns the grant this overlay amounts to on its assignment.
    #[must_use]
    pub fn as_grant(&self) -> PermissionGrant {
        PermissionGrant {
            key: self.key.clone(),
            scope: Some(self.scope),
            conditions: self.conditions.clone(),
            allowed_fields: self.allowed_fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::str::FromStr;

    use rolegate_core::TenantId;

    use super::{GrantConditions, PermissionGrant, PermissionScope};
    use crate::permission::PermissionKey;
    use crate::role::HierarchyLevel;

    #[test]
    fn scope_parsing_accepts_tenant_aliases() {
        assert_eq!(
            PermissionScope::from_str("tenant-specific").ok(),
            Some(PermissionScope::Tenant)
        );
        assert!(PermissionScope::from_str("galaxy").is_err());
    }

    #[test]
    fn tenant_scope_is_narrowest() {
        assert!(PermissionScope::Tenant.narrowness() > PermissionScope::Hierarchy.narrowness());
        assert!(PermissionScope::Hierarchy.narrowness() > PermissionScope::Global.narrowness());
        assert_eq!(
            PermissionScope::All.narrowness(),
            PermissionScope::Global.narrowness()
        );
    }

    #[test]
    fn combine_keeps_the_looser_of_both_conditions() {
        let first_tenant = TenantId::new();
        let second_tenant = TenantId::new();
        let left = GrantConditions {
            max_role_level: Some(HierarchyLevel::new(30)),
            allowed_tenants: BTreeSet::from([first_tenant]),
        };
        let right = GrantConditions {
            max_role_level: Some(HierarchyLevel::new(50)),
            allowed_tenants: BTreeSet::from([second_tenant]),
        };

        let combined = left.combine(&right);
        assert_eq!(combined.max_role_level, Some(HierarchyLevel::new(30)));
        assert_eq!(
            combined.allowed_tenants,
            BTreeSet::from([first_tenant, second_tenant])
        );

        let unrestricted = left.combine(&GrantConditions::default());
        assert!(unrestricted.is_empty());
    }

    #[test]
    fn direct_form_opens_unconditional_grants() {
        let key = PermissionKey::new("users", "view")
            .unwrap_or_else(|error| panic!("invalid test key: {error}"));
        let mut grant = PermissionGrant::unrestricted(key);
        grant.scope = Some(PermissionScope::Tenant);
        grant.allowed_fields = Some(BTreeSet::from(["email".to_owned()]));

        let opened = grant.direct_form();
        assert_eq!(opened.scope, Some(PermissionScope::All));
        assert!(opened.allowed_fields.is_none());

        grant.conditions.allowed_tenants.insert(TenantId::new());
        let conditional = grant.direct_form();
        assert_eq!(conditional.scope, Some(PermissionScope::Tenant));
        assert!(conditional.allowed_fields.is_some());
    }
}
