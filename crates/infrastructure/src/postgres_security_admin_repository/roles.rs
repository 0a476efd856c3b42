use tracing::info;

use super::*;

impl PostgresSecurityAdminRepository {
    pub(super) async fn create_custom_role_impl(
        &self,
        tenant_id: TenantId,
        input: NewCustomRole,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;
        let role = &input.role;

        sqlx::query(
            r#"
            INSERT INTO custom_roles (
                id,
                tenant_id,
                name,
                description,
                level,
                is_active,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(role.role_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(role.name.as_str())
        .bind(role.description.as_deref())
        .bind(level_to_column(role.level))
        .bind(role.is_active)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_role_conflict(error, role.name.as_str()))?;

        insert_role_grants(&mut transaction, role.role_id, &input.grants).await?;

        commit(transaction).await
    }

    pub(super) async fn update_custom_role_impl(
        &self,
        tenant_id: TenantId,
        input: CustomRoleUpdate,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;
        let role = &input.role;
        lock_live_role(&mut transaction, tenant_id, role.role_id).await?;

        sqlx::query(
            r#"
            UPDATE custom_roles
            SET name = $3,
                description = $4,
                level = $5,
                is_active = $6,
                updated_at = $7
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role.role_id.as_uuid())
        .bind(role.name.as_str())
        .bind(role.description.as_deref())
        .bind(level_to_column(role.level))
        .bind(role.is_active)
        .bind(role.updated_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_role_conflict(error, role.name.as_str()))?;

        if let Some(grants) = &input.grants {
            sqlx::query(
                r#"
                DELETE FROM custom_role_grants
                WHERE role_id = $1
                "#,
            )
            .bind(role.role_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| storage_error("clear custom role grants", error))?;

            insert_role_grants(&mut transaction, role.role_id, grants).await?;
        }

        commit(transaction).await
    }

    pub(super) async fn delete_custom_role_impl(
        &self,
        tenant_id: TenantId,
        role_id: CustomRoleId,
        force: bool,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut transaction = self.begin().await?;
        lock_live_role(&mut transaction, tenant_id, role_id).await?;

        let referencing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM role_assignments
            WHERE tenant_id = $1
                AND custom_role_id = $2
                AND is_active
                AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| storage_error("load custom role assignments", error))?;

        let cascaded = u64::try_from(referencing.len()).unwrap_or(u64::MAX);
        if !force && cascaded > 0 {
            return Err(AppError::RoleInUse {
                role_id: role_id.to_string(),
                count: cascaded,
            });
        }

        sqlx::query(
            r#"
            UPDATE role_assignments
            SET is_active = FALSE,
                deleted_at = $2
            WHERE id = ANY($1)
            "#,
        )
        .bind(referencing.as_slice())
        .bind(deleted_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| storage_error("deactivate custom role assignments", error))?;

        delete_overlays(&mut transaction, referencing.as_slice()).await?;

        sqlx::query(
            r#"
            DELETE FROM custom_role_grants
            WHERE role_id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| storage_error("delete custom role grants", error))?;

        sqlx::query(
            r#"
            UPDATE custom_roles
            SET is_active = FALSE,
                deleted_at = $3,
                updated_at = $3
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(deleted_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| storage_error("soft-delete custom role", error))?;

        commit(transaction).await?;

        if cascaded > 0 {
            info!(
                tenant_id = %tenant_id,
                role_id = %role_id,
                cascaded,
                "cascaded custom role deletion to assignments"
            );
        }

        Ok(cascaded)
    }
}

async fn lock_live_role(
    transaction: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    role_id: CustomRoleId,
) -> AppResult<()> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id
        FROM custom_roles
        WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL
        FOR UPDATE
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(role_id.as_uuid())
    .fetch_optional(&mut **transaction)
    .await
    .map_err(|error| storage_error("lock custom role", error))?
    .ok_or_else(|| {
        AppError::NotFound(format!(
            "custom role '{role_id}' was not found in tenant '{tenant_id}'"
        ))
    })?;

    Ok(())
}

async fn insert_role_grants(
    transaction: &mut Transaction<'_, Postgres>,
    role_id: CustomRoleId,
    grants: &[PermissionGrant],
) -> AppResult<()> {
    for grant in grants {
        sqlx::query(
            r#"
            INSERT INTO custom_role_grants (
                role_id,
                permission,
                scope,
                max_role_level,
                allowed_tenants,
                allowed_fields
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (role_id, permission) DO NOTHING
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(grant.key.to_string())
        .bind(grant.scope.map(|scope| scope.as_str()))
        .bind(level_to_column(grant.conditions.max_role_level))
        .bind(tenants_to_column(&grant.conditions))
        .bind(fields_to_column(grant.allowed_fields.as_ref()))
        .execute(&mut **transaction)
        .await
        .map_err(|error| storage_error("persist custom role grants", error))?;
    }

    Ok(())
}
