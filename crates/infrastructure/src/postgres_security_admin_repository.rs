use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use rolegate_application::{CustomRoleUpdate, NewAssignment, NewCustomRole, SecurityAdminRepository};
use rolegate_core::{AppError, AppResult, PrincipalId, TenantId};
use rolegate_domain::{
    AdvancedPermission, Assignment, AssignmentId, CustomRoleId, PermissionGrant, PermissionKey,
};

use crate::postgres_grant_columns::{
    fields_to_column, is_unique_violation, level_to_column, storage_error, tenants_to_column,
};

mod assignments;
mod roles;


/// PostgreSQL-backed repository for role and assignment administration.
#[derive(Clone)]
pub struct PostgresSecurityAdminRepository {
    pool: PgPool,
}

impl PostgresSecurityAdminRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'_, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|error| storage_error("begin transaction", error))
    }
}

async fn commit(transaction: Transaction<'_, Postgres>) -> AppResult<()> {
    transaction
        .commit()
        .await
        .map_err(|error| storage_error("commit transaction", error))
}

#[async_trait]
impl SecurityAdminRepository for PostgresSecurityAdminRepository {
    async fn create_custom_role(&self, tenant_id: TenantId, input: NewCustomRole) -> AppResult<()> {
        self.create_custom_role_impl(tenant_id, input).await
    }

    async fn update_custom_role(
        &self,
        tenant_id: TenantId,
        input: CustomRoleUpdate,
    ) -> AppResult<()> {
        self.update_custom_role_impl(tenant_id, input).await
    }

    async fn delete_custom_role(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
        force: bool,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.delete_custom_role_impl(tenant_id, role_id, force, deleted_at)
            .await
    }

    async fn create_assignment(&self, tenant_id: TenantId, input: NewAssignment) -> AppResult<()> {
        self.create_assignment_impl(tenant_id, input).await
    }

    async fn create_assignments(
        &self,
        tenant_id: TenantId,
        assignments: Vec<Assignment>,
    ) -> AppResult<()> {
        self.create_assignments_impl(tenant_id, assignments).await
    }

    async fn deactivate_assignment(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        removed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.deactivate_assignment_impl(tenant_id, assignment_id, removed_at)
            .await
    }

    async fn replace_advanced_permissions(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        overlays: Vec<AdvancedPermission>,
    ) -> AppResult<()> {
        self.replace_advanced_permissions_impl(tenant_id, assignment_id, overlays)
            .await
    }

    async fn save_direct_grant(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        grant: PermissionGrant,
        granted_by: PrincipalId,
    ) -> AppResult<()> {
        self.save_direct_grant_impl(tenant_id, principal_id, grant, granted_by)
            .await
    }

    async fn delete_direct_grant(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        key: &PermissionKey,
    ) -> AppResult<bool> {
        self.delete_direct_grant_impl(tenant_id, principal_id, key)
            .await
    }
}

async fn insert_overlays(
    transaction: &mut Transaction<'_, Postgres>,
    assignment_id: AssignmentId,
    overlays: &[AdvancedPermission],
) -> AppResult<()> {
    for overlay in overlays {
        sqlx::query(
            r#"
            INSERT INTO advanced_permissions (
                assignment_id,
                resource,
                action,
                scope,
                max_role_level,
                allowed_tenants,
                allowed_fields
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(assignment_id.as_uuid())
        .bind(overlay.key.resource())
        .bind(overlay.key.action())
        .bind(overlay.scope.as_str())
        .bind(level_to_column(overlay.conditions.max_role_level))
        .bind(tenants_to_column(&overlay.conditions))
        .bind(fields_to_column(overlay.allowed_fields.as_ref()))
        .execute(&mut **transaction)
        .await
        .map_err(|error| storage_error("persist advanced permission", error))?;
    }

    Ok(())
}

async fn delete_overlays(
    transaction: &mut Transaction<'_, Postgres>,
    assignment_ids: &[Uuid],
) -> AppResult<()> {
    sqlx::query(
        r#"
        DELETE FROM advanced_permissions
        WHERE assignment_id = ANY($1)
        "#,
    )
    .bind(assignment_ids)
    .execute(&mut **transaction)
    .await
    .map_err(|error| storage_error("delete advanced permissions", error))?;

    Ok(())
}

fn map_role_conflict(error: sqlx::Error, role_name: &str) -> AppError {
    if is_unique_violation(&error) {
        return AppError::DuplicateName(format!("role '{role_name}' already exists"));
    }

    storage_error("persist custom role", error)
}

fn map_assignment_conflict(error: sqlx::Error, assignment: &Assignment) -> AppError {
    if is_unique_violation(&error) {
        return AppError::AlreadyAssigned(format!(
            "principal '{}' already holds role '{}'",
            assignment.principal_id, assignment.role
        ));
    }

    storage_error("persist assignment", error)
}
