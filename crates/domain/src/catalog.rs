use std::collections::BTreeMap;

use rolegate_core::{AppError, AppResult};

use crate::permission::{PermissionDefinition, PermissionKey};
use crate::role::SystemRole;

/// Actions treated as read-only when building the fallback key space.
const READ_ONLY_ACTIONS: &[&str] = &["view", "read", "list"];

/// Built-in `(resource, action, description)` entries seeded into every deployment.
const BUILTIN_ENTRIES: &[(&str, &str, &str)] = &[
    ("users", "view", "View user profiles"),
    ("users", "create", "Create users"),
    ("users", "update", "Update user profiles"),
    ("users", "delete", "Deactivate users"),
    ("roles", "view", "View system and custom roles"),
    ("roles", "assign", "Assign roles to users"),
    ("custom_roles", "create", "Create tenant custom roles"),
    ("custom_roles", "update", "Edit tenant custom roles"),
    ("custom_roles", "delete", "Delete tenant custom roles"),
    ("permissions", "view", "View the permission catalog"),
    ("permissions", "grant", "Grant permissions directly to users"),
    ("tenants", "view", "View tenant settings"),
    ("tenants", "update", "Edit tenant settings"),
    ("trainings", "view", "View trainings"),
    ("trainings", "create", "Create trainings"),
    ("trainings", "update", "Edit trainings"),
    ("trainings", "delete", "Delete trainings"),
    ("trainings", "assign", "Assign trainings to users"),
    ("reports", "view", "View reports"),
    ("reports", "export", "Export reports"),
    ("audit", "view", "View the audit log"),
];

/// Default `resource:action` grants of each system role below the top level.
const BUILTIN_ROLE_GRANTS: &[(SystemRole, &[&str])] = &[
    (
        SystemRole::Admin,
        &[
            "users:view",
            "users:create",
            "users:update",
            "users:delete",
            "roles:view",
            "roles:assign",
            "custom_roles:create",
            "custom_roles:update",
            "custom_roles:delete",
            "permissions:view",
            "permissions:grant",
            "tenants:view",
            "tenants:update",
            "trainings:view",
            "trainings:create",
            "trainings:update",
            "trainings:delete",
            "trainings:assign",
            "reports:view",
            "reports:export",
            "audit:view",
        ],
    ),
    (
        SystemRole::HrManager,
        &[
            "users:view",
            "users:create",
            "users:update",
            "roles:view",
            "roles:assign",
            "trainings:view",
            "trainings:assign",
            "reports:view",
            "reports:export",
        ],
    ),
    (
        SystemRole::Manager,
        &[
            "users:view",
            "roles:view",
            "trainings:view",
            "trainings:assign",
            "reports:view",
        ],
    ),
    (
        SystemRole::Trainer,
        &[
            "users:view",
            "trainings:view",
            "trainings:create",
            "trainings:update",
        ],
    ),
    (SystemRole::Employee, &["trainings:view", "reports:view"]),
    (SystemRole::Guest, &["trainings:view"]),
];

/// Queryable registry of recognised permission keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionCatalog {
    entries: BTreeMap<PermissionKey, PermissionDefinition>,
}

impl PermissionCatalog {
    /// Builds a catalog from stored definitions. Later duplicates replace earlier ones.
    #[must_use]
    pub fn from_definitions(definitions: impl IntoIterator<Item = PermissionDefinition>) -> Self {
        let entries = definitions
            .into_iter()
            .map(|definition| (definition.key.clone(), definition))
            .collect();
        Self { entries }
    }

    /// Returns the built-in catalog shipped with the engine.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_definitions(builtin_definitions())
    }

    /// Returns every key in the catalog, active or not.
    pub fn keys(&self) -> impl Iterator<Item = &PermissionKey> {
        self.entries.keys()
    }

    /// Returns the read-only subset used for roles outside the known enumeration.
    pub fn read_only_keys(&self) -> impl Iterator<Item = &PermissionKey> {
        self.entries
            .keys()
            .filter(|key| READ_ONLY_ACTIONS.contains(&key.action()))
    }

    /// Returns the definition for one key.
    #[must_use]
    pub fn describe(&self, key: &PermissionKey) -> Option<&PermissionDefinition> {
        self.entries.get(key)
    }

    /// Returns whether the key is recognised.
    #[must_use]
    pub fn contains(&self, key: &PermissionKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Ensures the key exists and is active.
    pub fn ensure_grantable(&self, key: &PermissionKey) -> AppResult<()> {
        match self.entries.get(key) {
            Some(definition) if definition.is_active => Ok(()),
            Some(_) => Err(AppError::InvalidGrant(format!(
                "permission '{key}' is inactive"
            ))),
            None => Err(AppError::InvalidGrant(format!(
                "permission '{key}' is not in the catalog"
            ))),
        }
    }

    /// Groups definitions by resource, in resource then action order.
    #[must_use]
    pub fn grouped_by_resource(&self) -> BTreeMap<&str, Vec<&PermissionDefinition>> {
        let mut groups: BTreeMap<&str, Vec<&PermissionDefinition>> = BTreeMap::new();
        for (key, definition) in &self.entries {
            groups.entry(key.resource()).or_default().push(definition);
        }
        groups
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Returns the built-in catalog definitions in declaration order.
#[must_use]
pub fn builtin_definitions() -> Vec<PermissionDefinition> {
    BUILTIN_ENTRIES
        .iter()
        .filter_map(|(resource, action, description)| {
            let key = PermissionKey::new(*resource, *action).ok()?;
            Some(PermissionDefinition {
                permission_id: key.to_string(),
                name: key.to_legacy_string(),
                key,
                description: Some((*description).to_owned()),
                is_active: true,
            })
        })
        .collect()
}

/// Returns the default grants of every system role.
///
/// The top-level role receives the whole built-in catalog.
#[must_use]
pub fn builtin_system_role_grants() -> Vec<(SystemRole, Vec<PermissionKey>)> {
    let mut grants = vec![(
        SystemRole::SuperAdmin,
        builtin_definitions()
            .into_iter()
            .map(|definition| definition.key)
            .collect(),
    )];

    grants.extend(BUILTIN_ROLE_GRANTS.iter().map(|(role, keys)| {
        (
            *role,
            keys.iter()
                .filter_map(|key| PermissionKey::parse(key).ok())
                .collect(),
        )
    }));

    grants
}
