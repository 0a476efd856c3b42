//! Conflict-free merge of role grants, overlays and direct grants.

use std::collections::{BTreeMap, BTreeSet};

use rolegate_core::TenantId;
use serde::{Serialize, Serializer};

use crate::catalog::PermissionCatalog;
use crate::grant::{AdvancedPermission, GrantConditions, PermissionGrant, PermissionScope};
use crate::permission::PermissionKey;
use crate::role::HierarchyLevel;

/// Resolved state of one catalog key for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermission {
    /// Resolved key.
    pub key: PermissionKey,
    /// Whether any source grants the key.
    pub granted: bool,
    /// Effective scope; `None` while the key is denied.
    pub scope: Option<PermissionScope>,
    /// Effective conditions.
    pub conditions: GrantConditions,
    /// Visible fields. `None` means every field is visible.
    pub allowed_fields: Option<BTreeSet<String>>,
}

impl EffectivePermission {
    fn denied(key: PermissionKey) -> Self {
        Self {
            key,
            granted: false,
            scope: None,
            conditions: GrantConditions::default(),
            allowed_fields: None,
        }
    }

    fn effective_scope(&self) -> PermissionScope {
        self.scope.unwrap_or_default()
    }

    /// Returns whether `grant` is no broader than this entry.
    ///
    /// The grant's scope must be at least as narrow. Where the entry restricts
    /// tenants, level or fields, the grant must carry a restriction inside it.
    #[must_use]
    pub fn covers(&self, grant: &PermissionGrant) -> bool {
        if !self.granted || self.key != grant.key {
            return false;
        }

        if grant.scope.unwrap_or_default().narrowness() < self.effective_scope().narrowness() {
            return false;
        }

        let held = &self.conditions;
        let requested = &grant.conditions;
        if !held.allowed_tenants.is_empty()
            && (requested.allowed_tenants.is_empty()
                || !requested.allowed_tenants.is_subset(&held.allowed_tenants))
        {
            return false;
        }

        if let Some(held_cap) = held.max_role_level
            && !requested
                .max_role_level
                .is_some_and(|requested_cap| held_cap.outranks_or_equals(requested_cap))
        {
            return false;
        }

        match (&self.allowed_fields, &grant.allowed_fields) {
            (None, _) => true,
            (Some(held_fields), Some(requested_fields)) => requested_fields.is_subset(held_fields),
            (Some(_), None) => false,
        }
    }
}

/// Optional resource context evaluated against grant conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    /// Tenant owning the resource.
    pub tenant_id: Option<TenantId>,
    /// Best level of the principal the action targets.
    pub target_level: Option<HierarchyLevel>,
    /// Field being read or written.
    pub field: Option<String>,
}

/// Complete decision map over a key space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMap {
    entries: BTreeMap<PermissionKey, EffectivePermission>,
}

impl PermissionMap {
    /// Creates a map with every key denied.
    #[must_use]
    pub fn denied<'a>(keys: impl IntoIterator<Item = &'a PermissionKey>) -> Self {
        let entries = keys
            .into_iter()
            .map(|key| (key.clone(), EffectivePermission::denied(key.clone())))
            .collect();
        Self { entries }
    }

    /// Creates the starting map for one role source.
    ///
    /// Recognised roles span the whole catalog; unrecognised stored role types
    /// only span the read-only keys.
    #[must_use]
    pub fn for_role_source(catalog: &PermissionCatalog, recognised: bool) -> Self {
        if recognised {
            Self::denied(catalog.keys())
        } else {
            Self::denied(catalog.read_only_keys())
        }
    }

    /// Applies base role grants. Keys outside the map are ignored.
    pub fn apply_role_grants(&mut self, grants: &[PermissionGrant]) {
        for grant in grants {
            if let Some(entry) = self.entries.get_mut(&grant.key) {
                entry.granted = true;
                entry.scope = Some(grant.scope.unwrap_or_default());
                entry.conditions = grant.conditions.clone();
                entry.allowed_fields = grant.allowed_fields.clone();
            }
        }
    }

    /// Applies assignment overlays. Overlays grant and overwrite metadata, never revoke.
    pub fn apply_overlays(&mut self, overlays: &[AdvancedPermission]) {
        for overlay in overlays {
            if let Some(entry) = self.entries.get_mut(&overlay.key) {
                entry.granted = true;
                entry.scope = Some(overlay.scope);
                entry.conditions = overlay.conditions.clone();
                entry.allowed_fields = overlay.allowed_fields.clone();
            }
        }
    }

    /// Unions another source into this map.
    ///
    /// Only granted entries of `other` contribute. Between two granted entries
    /// the narrower scope wins; equal scopes combine their conditions. An
    /// unrestricted field list on either side keeps the key unrestricted.
    pub fn merge(&mut self, other: &Self) {
        for (key, incoming) in &other.entries {
            let Some(current) = self.entries.get_mut(key) else {
                self.entries.insert(key.clone(), incoming.clone());
                continue;
            };

            if !incoming.granted {
                continue;
            }

            if !current.granted {
                *current = incoming.clone();
                continue;
            }

            let current_scope = current.effective_scope();
            let incoming_scope = incoming.effective_scope();
            if incoming_scope.narrowness() > current_scope.narrowness() {
                current.scope = Some(incoming_scope);
                current.conditions = incoming.conditions.clone();
            } else if incoming_scope.narrowness() == current_scope.narrowness() {
                current.conditions = current.conditions.combine(&incoming.conditions);
            }

            current.allowed_fields = match (&current.allowed_fields, &incoming.allowed_fields) {
                (Some(left), Some(right)) => Some(left.union(right).cloned().collect()),
                _ => None,
            };
        }
    }

    /// Applies principal-level grants last.
    ///
    /// Unconditional grants reset the key to `all` scope with no conditions and
    /// every field visible.
    pub fn apply_direct_grants(&mut self, grants: &[PermissionGrant]) {
        for grant in grants {
            let Some(entry) = self.entries.get_mut(&grant.key) else {
                continue;
            };

            let applied = grant.direct_form();
            entry.granted = true;
            entry.scope = Some(applied.scope.unwrap_or_default());
            entry.conditions = applied.conditions;
            entry.allowed_fields = applied.allowed_fields;
        }
    }

    /// Returns whether handing out `grant` stays within what this map holds for its key.
    #[must_use]
    pub fn covers(&self, grant: &PermissionGrant) -> bool {
        self.entries
            .get(&grant.key)
            .is_some_and(|entry| entry.covers(grant))
    }

    /// Returns the resolved entry for a key.
    #[must_use]
    pub fn get(&self, key: &PermissionKey) -> Option<&EffectivePermission> {
        self.entries.get(key)
    }

    /// Returns whether the key is granted, ignoring conditions.
    #[must_use]
    pub fn is_granted(&self, key: &PermissionKey) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.granted)
    }

    /// Returns whether the key is granted and its conditions admit `context`.
    #[must_use]
    pub fn permits(&self, key: &PermissionKey, context: &AccessContext) -> bool {
        let Some(entry) = self.entries.get(key) else {
            return false;
        };
        if !entry.granted {
            return false;
        }

        if let Some(tenant_id) = context.tenant_id
            && !entry.conditions.allowed_tenants.is_empty()
            && !entry.conditions.allowed_tenants.contains(&tenant_id)
        {
            return false;
        }

        if let Some(target_level) = context.target_level
            && let Some(cap) = entry.conditions.max_role_level
            && !cap.outranks_or_equals(target_level)
        {
            return false;
        }

        if let Some(field) = context.field.as_deref()
            && let Some(allowed_fields) = &entry.allowed_fields
            && !allowed_fields.contains(field)
        {
            return false;
        }

        true
    }

    /// Returns granted keys in key order.
    pub fn granted_keys(&self) -> impl Iterator<Item = &PermissionKey> {
        self.entries
            .values()
            .filter(|entry| entry.granted)
            .map(|entry| &entry.key)
    }

    /// Returns every entry in key order.
    pub fn iter(&self) -> impl Iterator<Item = &EffectivePermission> {
        self.entries.values()
    }

    /// Returns the number of keys covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the map covers no key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for PermissionMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(
            self.entries
                .iter()
                .map(|(key, entry)| (key.to_string(), entry)),
        )
    }
}
