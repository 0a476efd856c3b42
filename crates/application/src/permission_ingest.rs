//! Boundary parsing of stored and caller-supplied permission identifiers.
//!
//! Stored rows that fail to parse are dropped with a warning so one bad row
//! never blocks resolution. Caller input fails only when every entry of a
//! non-empty batch is malformed.

use std::collections::BTreeSet;
use std::str::FromStr;

use rolegate_core::{AppError, AppResult, TenantId};
use rolegate_domain::{
    AdvancedPermission, AssignmentId, GrantConditions, PermissionCatalog, PermissionDefinition,
    PermissionGrant, PermissionKey, PermissionScope, RoleRef, SystemRole,
};
use tracing::warn;

use crate::authorization_ports::{
    AdvancedPermissionInput, AssignmentRecord, CatalogRecord, GrantInput, GrantRecord,
    OverlayRecord,
};

/// Role reference of a stored assignment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoredRole {
    /// Recognised system or custom role.
    Known(RoleRef),
    /// Role type string outside the system enumeration.
    Unrecognized(String),
}

pub(crate) fn catalog_from_records(records: Vec<CatalogRecord>) -> PermissionCatalog {
    PermissionCatalog::from_definitions(records.into_iter().filter_map(|record| {
        match PermissionKey::new(record.resource.as_str(), record.action.as_str()) {
            Ok(key) => Some(PermissionDefinition {
                permission_id: record.permission_id,
                key,
                name: record.name,
                description: record.description,
                is_active: record.is_active,
            }),
            Err(error) => {
                warn!(
                    permission_id = %record.permission_id,
                    error = %error,
                    "dropping malformed catalog entry"
                );
                None
            }
        }
    }))
}

pub(crate) fn grants_from_records(records: Vec<GrantRecord>, source: &str) -> Vec<PermissionGrant> {
    records
        .into_iter()
        .filter_map(|record| {
            let key = match PermissionKey::parse(record.permission.as_str()) {
                Ok(key) => key,
                Err(error) => {
                    warn!(source, error = %error, "dropping malformed stored grant");
                    return None;
                }
            };
            let scope = stored_scope(record.scope.as_deref(), source)?;

            Some(PermissionGrant {
                key,
                scope,
                conditions: GrantConditions {
                    max_role_level: record.max_role_level,
                    allowed_tenants: record.allowed_tenants,
                },
                allowed_fields: record.allowed_fields,
            })
        })
        .collect()
}

pub(crate) fn overlays_from_records(
    records: Vec<OverlayRecord>,
    assignment_id: AssignmentId,
) -> Vec<AdvancedPermission> {
    let source = format!("assignment {assignment_id}");
    records
        .into_iter()
        .filter_map(|record| {
            let key = match PermissionKey::new(record.resource.as_str(), record.action.as_str()) {
                Ok(key) => key,
                Err(error) => {
                    warn!(%assignment_id, error = %error, "dropping malformed stored overlay");
                    return None;
                }
            };
            let scope = stored_scope(record.scope.as_deref(), source.as_str())?;

            Some(AdvancedPermission {
                key,
                scope: scope.unwrap_or_default(),
                conditions: GrantConditions {
                    max_role_level: record.max_role_level,
                    allowed_tenants: record.allowed_tenants,
                },
                allowed_fields: record.allowed_fields,
            })
        })
        .collect()
}

/// Returns `None` for an unparseable stored scope; `Some(None)` when no scope is stored.
fn stored_scope(value: Option<&str>, source: &str) -> Option<Option<PermissionScope>> {
    match value {
        None => Some(None),
        Some(value) => match PermissionScope::from_str(value) {
            Ok(scope) => Some(Some(scope)),
            Err(error) => {
                warn!(source, error = %error, "dropping grant with unknown scope");
                None
            }
        },
    }
}

pub(crate) fn stored_role(record: &AssignmentRecord) -> Option<StoredRole> {
    match (record.role_type.as_deref(), record.custom_role_id) {
        (Some(role_type), None) => Some(match SystemRole::from_str(role_type) {
            Ok(role) => StoredRole::Known(RoleRef::System(role)),
            Err(_) => StoredRole::Unrecognized(role_type.to_owned()),
        }),
        (None, Some(role_id)) => Some(StoredRole::Known(RoleRef::Custom(role_id))),
        _ => {
            warn!(
                assignment_id = %record.assignment_id,
                "skipping assignment without exactly one role reference"
            );
            None
        }
    }
}

pub(crate) fn stored_baseline(value: Option<String>, tenant_id: TenantId) -> Option<SystemRole> {
    let value = value?;
    match SystemRole::from_str(value.as_str()) {
        Ok(role) => Some(role),
        Err(_) => {
            warn!(%tenant_id, baseline = %value, "ignoring unknown custom role baseline");
            None
        }
    }
}

/// Parses caller grants, dropping malformed entries.
pub(crate) fn grants_from_inputs(inputs: Vec<GrantInput>) -> AppResult<Vec<PermissionGrant>> {
    let supplied = inputs.len();
    let grants = inputs
        .into_iter()
        .filter_map(|input| match PermissionKey::parse(input.permission.as_str()) {
            Ok(key) => Some(PermissionGrant {
                key,
                scope: input.scope,
                conditions: input.conditions,
                allowed_fields: input.allowed_fields,
            }),
            Err(error) => {
                warn!(error = %error, "dropping malformed grant input");
                None
            }
        })
        .collect::<Vec<_>>();

    if supplied > 0 && grants.is_empty() {
        return Err(AppError::MalformedPermissionKey(format!(
            "none of the {supplied} supplied permission identifier(s) could be parsed"
        )));
    }

    Ok(grants)
}

/// Parses caller overlays, dropping malformed entries and rejecting duplicate keys.
pub(crate) fn overlays_from_inputs(
    inputs: Vec<AdvancedPermissionInput>,
) -> AppResult<Vec<AdvancedPermission>> {
    let supplied = inputs.len();
    let mut seen = BTreeSet::new();
    let mut overlays = Vec::with_capacity(supplied);

    for input in inputs {
        let key = match PermissionKey::parse(input.permission.as_str()) {
            Ok(key) => key,
            Err(error) => {
                warn!(error = %error, "dropping malformed advanced permission input");
                continue;
            }
        };

        if !seen.insert(key.clone()) {
            return Err(AppError::Validation(format!(
                "advanced permission '{key}' is listed more than once"
            )));
        }

        overlays.push(AdvancedPermission {
            key,
            scope: input.scope,
            conditions: input.conditions,
            allowed_fields: input.allowed_fields,
        });
    }

    if supplied > 0 && overlays.is_empty() {
        return Err(AppError::MalformedPermissionKey(format!(
            "none of the {supplied} supplied advanced permission identifier(s) could be parsed"
        )));
    }

    Ok(overlays)
}
