use super::*;

impl PostgresSecurityAdminRepository {
    pub(super) async fn create_assignment_impl(
        &self,
        tenant_id: TenantId,
        input: NewAssignment,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;
        insert_assignment(&mut transaction, tenant_id, &input.assignment).await?;
        insert_overlays(
            &mut transaction,
            input.assignment.assignment_id,
            &input.overlays,
        )
        .await?;
        commit(transaction).await
    }

    pub(super) async fn create_assignments_impl(
        &self,
        tenant_id: TenantId,
        assignments: Vec<Assignment>,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;
        for assignment in &assignments {
            insert_assignment(&mut transaction, tenant_id, assignment).await?;
        }
        commit(transaction).await
    }

    pub(super) async fn deactivate_assignment_impl(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        removed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE role_assignments
            SET is_active = FALSE,
                deleted_at = $3
            WHERE tenant_id = $1
                AND id = $2
                AND is_active
                AND deleted_at IS NULL
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(assignment_id.as_uuid())
        .bind(removed_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| storage_error("deactivate assignment", error))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotAssigned(format!(
                "assignment '{assignment_id}' is not active in tenant '{tenant_id}'"
            )));
        }

        delete_overlays(&mut transaction, &[assignment_id.as_uuid()]).await?;
        commit(transaction).await
    }

    pub(super) async fn replace_advanced_permissions_impl(
        &self,
        tenant_id: TenantId,
        assignment_id: AssignmentId,
        overlays: Vec<AdvancedPermission>,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;

        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM role_assignments
            WHERE tenant_id = $1 AND id = $2 AND is_active AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(assignment_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| storage_error("lock assignment", error))?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "assignment '{assignment_id}' was not found in tenant '{tenant_id}'"
            ))
        })?;

        delete_overlays(&mut transaction, &[assignment_id.as_uuid()]).await?;
        insert_overlays(&mut transaction, assignment_id, &overlays).await?;
        commit(transaction).await
    }

    pub(super) async fn save_direct_grant_impl(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        grant: PermissionGrant,
        granted_by: PrincipalId,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;

        // Rows stored in the legacy form would otherwise shadow the upsert.
        sqlx::query(
            r#"
            DELETE FROM direct_grants
            WHERE tenant_id = $1 AND principal_id = $2 AND permission = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(principal_id.as_uuid())
        .bind(grant.key.to_legacy_string())
        .execute(&mut *transaction)
        .await
        .map_err(|error| storage_error("replace direct grant", error))?;

        sqlx::query(
            r#"
            INSERT INTO direct_grants (
                tenant_id,
                principal_id,
                permission,
                scope,
                max_role_level,
                allowed_tenants,
                allowed_fields,
                granted_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_id, principal_id, permission) DO UPDATE
            SET scope = EXCLUDED.scope,
                max_role_level = EXCLUDED.max_role_level,
                allowed_tenants = EXCLUDED.allowed_tenants,
                allowed_fields = EXCLUDED.allowed_fields,
                granted_by = EXCLUDED.granted_by,
                granted_at = now()
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(principal_id.as_uuid())
        .bind(grant.key.to_string())
        .bind(grant.scope.map(|scope| scope.as_str()))
        .bind(level_to_column(grant.conditions.max_role_level))
        .bind(tenants_to_column(&grant.conditions))
        .bind(fields_to_column(grant.allowed_fields.as_ref()))
        .bind(granted_by.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| storage_error("save direct grant", error))?;

        commit(transaction).await
    }

    pub(super) async fn delete_direct_grant_impl(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        key: &PermissionKey,
    ) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM direct_grants
            WHERE tenant_id = $1
                AND principal_id = $2
                AND permission = ANY($3)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(principal_id.as_uuid())
        .bind(vec![key.to_string(), key.to_legacy_string()])
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("delete direct grant", error))?
        .rows_affected();

        Ok(rows_affected > 0)
    }
}

async fn insert_assignment(
    transaction: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    assignment: &Assignment,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO role_assignments (
            id,
            tenant_id,
            principal_id,
            role_type,
            custom_role_id,
            assigned_by,
            assigned_at,
            valid_from,
            valid_until,
            is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(assignment.assignment_id.as_uuid())
    .bind(tenant_id.as_uuid())
    .bind(assignment.principal_id.as_uuid())
    .bind(assignment.role.as_system().map(|role| role.as_str()))
    .bind(assignment.role.as_custom().map(|role_id| role_id.as_uuid()))
    .bind(assignment.assigned_by.as_uuid())
    .bind(assignment.assigned_at)
    .bind(assignment.valid_from)
    .bind(assignment.valid_until)
    .bind(assignment.is_active)
    .execute(&mut **transaction)
    .await
    .map_err(|error| map_assignment_conflict(error, assignment))?;

    Ok(())
}
