use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rolegate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Structured `(resource, action)` pair identifying one catalog permission.
///
/// Both parts are lower-case ASCII identifiers. The canonical string form is
/// `resource:action`; the legacy `ACTION_RESOURCE` form is accepted by
/// [`PermissionKey::parse`] only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    resource: String,
    action: String,
}

impl PermissionKey {
    /// Creates a key from already separated parts.
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> AppResult<Self> {
        let resource = normalize_part(resource.into().as_str(), "resource")?;
        let action = normalize_part(action.into().as_str(), "action")?;
        Ok(Self { resource, action })
    }

    /// Parses either `resource:action` or the legacy `ACTION_RESOURCE` form.
    ///
    /// The legacy form splits on the first underscore, so
    /// `MANAGE_CUSTOM_ROLES` becomes `custom_roles:manage`.
    pub fn parse(value: &str) -> AppResult<Self> {
        let trimmed = value.trim();

        if let Some((resource, action)) = trimmed.split_once(':') {
            return Self::new(resource, action).map_err(|_| malformed(value));
        }

        if let Some((action, resource)) = trimmed.split_once('_') {
            return Self::new(resource, action).map_err(|_| malformed(value));
        }

        Err(malformed(value))
    }

    /// Returns the resource part.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the action part.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_str()
    }

    /// Returns the legacy `ACTION_RESOURCE` storage form.
    #[must_use]
    pub fn to_legacy_string(&self) -> String {
        format!(
            "{}_{}",
            self.action.to_ascii_uppercase(),
            self.resource.to_ascii_uppercase()
        )
    }
}

impl Display for PermissionKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource, self.action)
    }
}

impl FromStr for PermissionKey {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

fn normalize_part(value: &str, label: &str) -> AppResult<String> {
    let normalized = value.trim().to_ascii_lowercase();
    let is_valid = !normalized.is_empty()
        && !normalized.starts_with('_')
        && !normalized.ends_with('_')
        && normalized
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '-'));

    if !is_valid {
        return Err(AppError::MalformedPermissionKey(format!(
            "permission {label} '{value}' must be a non-empty identifier"
        )));
    }

    Ok(normalized)
}

fn malformed(value: &str) -> AppError {
    AppError::MalformedPermissionKey(format!(
        "'{value}' does not parse into a resource and an action"
    ))
}

/// Catalog entry describing one recognised permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    /// Stable permission identifier.
    pub permission_id: String,
    /// Structured key.
    pub key: PermissionKey,
    /// Human-readable name.
    pub name: String,
    /// Optional description for administrative views.
    pub description: Option<String>,
    /// Inactive entries stay visible but cannot be granted.
    pub is_active: bool,
}
