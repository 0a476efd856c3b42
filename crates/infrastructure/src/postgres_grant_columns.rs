//! Column encodings shared by the grant, overlay and direct grant tables.

use std::collections::BTreeSet;

use rolegate_core::{AppError, TenantId};
use rolegate_domain::{GrantConditions, HierarchyLevel};
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

use rolegate_application::GrantRecord;

/// Row shape of `system_role_grants`, `custom_role_grants` and `direct_grants`.
#[derive(Debug, FromRow)]
pub(crate) struct GrantRow {
    pub permission: String,
    pub scope: Option<String>,
    pub max_role_level: Option<i32>,
    pub allowed_tenants: Vec<Uuid>,
    pub allowed_fields: Option<Vec<String>>,
}

impl GrantRow {
    pub(crate) fn into_record(self) -> GrantRecord {
        GrantRecord {
            max_role_level: level_from_column(self.max_role_level, self.permission.as_str()),
            allowed_tenants: tenants_from_column(self.allowed_tenants),
            allowed_fields: fields_from_column(self.allowed_fields),
            permission: self.permission,
            scope: self.scope,
        }
    }
}

pub(crate) fn level_from_column(value: Option<i32>, context: &str) -> Option<HierarchyLevel> {
    let value = value?;
    match u16::try_from(value) {
        Ok(level) => Some(HierarchyLevel::new(level)),
        Err(_) => {
            warn!(level = value, context, "ignoring out-of-range stored level");
            None
        }
    }
}

pub(crate) fn level_to_column(level: Option<HierarchyLevel>) -> Option<i32> {
    level.map(|level| i32::from(level.value()))
}

pub(crate) fn tenants_from_column(values: Vec<Uuid>) -> BTreeSet<TenantId> {
    values.into_iter().map(TenantId::from_uuid).collect()
}

pub(crate) fn tenants_to_column(conditions: &GrantConditions) -> Vec<Uuid> {
    conditions
        .allowed_tenants
        .iter()
        .map(TenantId::as_uuid)
        .collect()
}

pub(crate) fn fields_from_column(values: Option<Vec<String>>) -> Option<BTreeSet<String>> {
    values.map(|values| values.into_iter().collect())
}

pub(crate) fn fields_to_column(fields: Option<&BTreeSet<String>>) -> Option<Vec<String>> {
    fields.map(|fields| fields.iter().cloned().collect())
}

pub(crate) fn storage_error(action: &str, error: sqlx::Error) -> AppError {
    AppError::StorageFailure(format!("failed to {action}: {error}"))
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(database_error) = error
        && database_error.code().as_deref() == Some("23505")
    {
        return true;
    }

    false
}
