use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use rolegate_application::{
    AssignmentRecord, AuthorizationRepository, CatalogRecord, GrantRecord, OverlayRecord,
    PrincipalRecord,
};
use rolegate_core::{AppResult, PrincipalId, TenantId};
use rolegate_domain::{AssignmentId, CustomRole, CustomRoleId};

use crate::postgres_grant_columns::{
    GrantRow, fields_from_column, level_from_column, storage_error, tenants_from_column,
};

/// PostgreSQL-backed repository for resolution and hierarchy lookups.
#[derive(Clone)]
pub struct PostgresAuthorizationRepository {
    pool: PgPool,
}

impl PostgresAuthorizationRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CatalogRow {
    id: String,
    name: String,
    resource: String,
    action: String,
    description: Option<String>,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct PrincipalRow {
    id: Uuid,
    tenant_id: Uuid,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: Uuid,
    tenant_id: Uuid,
    principal_id: Uuid,
    role_type: Option<String>,
    custom_role_id: Option<Uuid>,
    assigned_by: Uuid,
    assigned_at: DateTime<Utc>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<AssignmentRow> for AssignmentRecord {
    fn from(row: AssignmentRow) -> Self {
        Self {
            assignment_id: AssignmentId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            principal_id: PrincipalId::from_uuid(row.principal_id),
            role_type: row.role_type,
            custom_role_id: row.custom_role_id.map(CustomRoleId::from_uuid),
            assigned_by: PrincipalId::from_uuid(row.assigned_by),
            assigned_at: row.assigned_at,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            is_active: row.is_active,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CustomRoleRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    description: Option<String>,
    level: Option<i32>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<CustomRoleRow> for CustomRole {
    fn from(row: CustomRoleRow) -> Self {
        Self {
            level: level_from_column(row.level, row.name.as_str()),
            role_id: CustomRoleId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct OverlayRow {
    resource: String,
    action: String,
    scope: String,
    max_role_level: Option<i32>,
    allowed_tenants: Vec<Uuid>,
    allowed_fields: Option<Vec<String>>,
}

const ASSIGNMENT_COLUMNS: &str = r#"
    id, tenant_id, principal_id, role_type, custom_role_id, assigned_by,
    assigned_at, valid_from, valid_until, is_active, deleted_at
"#;

const CUSTOM_ROLE_COLUMNS: &str = r#"
    id, tenant_id, name, description, level, is_active, created_at, updated_at, deleted_at
"#;

#[async_trait]
impl AuthorizationRepository for PostgresAuthorizationRepository {
    async fn list_catalog_permissions(&self, tenant_id: TenantId) -> AppResult<Vec<CatalogRecord>> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r#"
            SELECT id, name, resource, action, description, is_active
            FROM permissions
            WHERE tenant_id IS NULL OR tenant_id = $1
            ORDER BY resource, action
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list permission catalog", error))?;

        Ok(rows
            .into_iter()
            .map(|row| CatalogRecord {
                permission_id: row.id,
                name: row.name,
                resource: row.resource,
                action: row.action,
                description: row.description,
                is_active: row.is_active,
            })
            .collect())
    }

    async fn find_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Option<PrincipalRecord>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, tenant_id, is_active
            FROM principals
            WHERE id = $1
            "#,
        )
        .bind(principal_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("find principal", error))?;

        Ok(row.map(|row| PrincipalRecord {
            principal_id: PrincipalId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            is_active: row.is_active,
        }))
    }

    async fn custom_role_baseline(&self, tenant_id: TenantId) -> AppResult<Option<String>> {
        let baseline = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT custom_role_baseline
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load custom role baseline", error))?;

        Ok(baseline.flatten())
    }

    async fn list_assignments_for_principal(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<AssignmentRecord>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM role_assignments
            WHERE tenant_id = $1 AND principal_id = $2
            ORDER BY assigned_at
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(principal_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list assignments", error))?;

        Ok(rows.into_iter().map(AssignmentRecord::from).collect())
    }

    async fn find_assignment(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
    ) -> AppResult<Option<AssignmentRecord>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM role_assignments
            WHERE tenant_id = $1 AND id = $2
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(assignment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("find assignment", error))?;

        Ok(row.map(AssignmentRecord::from))
    }

    async fn list_system_role_grants(&self, role_type: &str) -> AppResult<Vec<GrantRecord>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT permission, scope, max_role_level, allowed_tenants, allowed_fields
            FROM system_role_grants
            WHERE role_type = $1
            ORDER BY permission
            "#,
        )
        .bind(role_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list system role grants", error))?;

        Ok(rows.into_iter().map(GrantRow::into_record).collect())
    }

    async fn list_custom_role_grants(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<Vec<GrantRecord>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT
                grants.permission,
                grants.scope,
                grants.max_role_level,
                grants.allowed_tenants,
                grants.allowed_fields
            FROM custom_role_grants AS grants
            INNER JOIN custom_roles AS roles
                ON roles.id = grants.role_id
            WHERE roles.tenant_id = $1 AND roles.id = $2
            ORDER BY grants.permission
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list custom role grants", error))?;

        Ok(rows.into_iter().map(GrantRow::into_record).collect())
    }

    async fn list_advanced_permissions(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<OverlayRecord>> {
        let rows = sqlx::query_as::<_, OverlayRow>(
            r#"
            SELECT
                overlays.resource,
                overlays.action,
                overlays.scope,
                overlays.max_role_level,
                overlays.allowed_tenants,
                overlays.allowed_fields
            FROM advanced_permissions AS overlays
            INNER JOIN role_assignments AS assignments
                ON assignments.id = overlays.assignment_id
            WHERE assignments.tenant_id = $1 AND assignments.id = $2
            ORDER BY overlays.resource, overlays.action
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(assignment_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list advanced permissions", error))?;

        Ok(rows
            .into_iter()
            .map(|row| OverlayRecord {
                max_role_level: level_from_column(row.max_role_level, row.resource.as_str()),
                allowed_tenants: tenants_from_column(row.allowed_tenants),
                allowed_fields: fields_from_column(row.allowed_fields),
                resource: row.resource,
                action: row.action,
                scope: Some(row.scope),
            })
            .collect())
    }

    async fn list_direct_grants(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<GrantRecord>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT permission, scope, max_role_level, allowed_tenants, allowed_fields
            FROM direct_grants
            WHERE tenant_id = $1 AND principal_id = $2
            ORDER BY permission
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(principal_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list direct grants", error))?;

        Ok(rows.into_iter().map(GrantRow::into_record).collect())
    }

    async fn find_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<Option<CustomRole>> {
        let row = sqlx::query_as::<_, CustomRoleRow>(&format!(
            r#"
            SELECT {CUSTOM_ROLE_COLUMNS}
            FROM custom_roles
            WHERE tenant_id = $1 AND id = $2
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("find custom role", error))?;

        Ok(row.map(CustomRole::from))
    }

    async fn list_custom_roles(
        &self,
        tenant_id: TenantId,
        include_deleted: bool,
    ) -> AppResult<Vec<CustomRole>> {
        let rows = sqlx::query_as::<_, CustomRoleRow>(&format!(
            r#"
            SELECT {CUSTOM_ROLE_COLUMNS}
            FROM custom_roles
            WHERE tenant_id = $1 AND ($2 OR deleted_at IS NULL)
            ORDER BY name
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list custom roles", error))?;

        Ok(rows.into_iter().map(CustomRole::from).collect())
    }

    async fn count_active_assignments_for_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
    ) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM role_assignments
            WHERE tenant_id = $1
                AND custom_role_id = $2
                AND is_active
                AND deleted_at IS NULL
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| storage_error("count custom role assignments", error))?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
