use rolegate_core::{AppError, AppResult};
use rolegate_domain::{SystemRole, builtin_definitions, builtin_system_role_grants};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

const DEMO_TENANT_ID: &str = "11111111-1111-1111-1111-111111111111";
const DEMO_TENANT_NAME: &str = "Demo Training Academy";
const DEMO_ADMIN_ID: &str = "a2c8ea5f-4f39-4724-97f5-932f97f54f76";
const DEMO_ADMIN_DISPLAY_NAME: &str = "Tenant Admin";
const DEMO_ADMIN_ASSIGNMENT_ID: &str = "5d0b7a51-3f3c-4f0e-9a53-2f3f6a1c9e10";

/// Seeds the global catalog, default system role grants and a demo tenant.
pub async fn run(pool: &PgPool) -> AppResult<()> {
    let mut transaction = pool
        .begin()
        .await
        .map_err(|error| storage("begin seed transaction", error))?;

    let definitions = builtin_definitions();
    for definition in &definitions {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, tenant_id, name, resource, action, description, is_active)
            VALUES ($1, NULL, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description
            "#,
        )
        .bind(definition.permission_id.as_str())
        .bind(definition.name.as_str())
        .bind(definition.key.resource())
        .bind(definition.key.action())
        .bind(definition.description.as_deref())
        .bind(definition.is_active)
        .execute(&mut *transaction)
        .await
        .map_err(|error| storage("seed permission catalog", error))?;
    }

    let mut grant_count = 0_usize;
    for (role, keys) in builtin_system_role_grants() {
        for key in keys {
            // Existing rows are left alone so operator edits survive reseeding.
            sqlx::query(
                r#"
                INSERT INTO system_role_grants (role_type, permission)
                VALUES ($1, $2)
                ON CONFLICT (role_type, permission) DO NOTHING
                "#,
            )
            .bind(role.as_str())
            .bind(key.to_string())
            .execute(&mut *transaction)
            .await
            .map_err(|error| storage("seed system role grants", error))?;
            grant_count += 1;
        }
    }

    let tenant_id = parse_seed_uuid(DEMO_TENANT_ID)?;
    let admin_id = parse_seed_uuid(DEMO_ADMIN_ID)?;
    let assignment_id = parse_seed_uuid(DEMO_ADMIN_ASSIGNMENT_ID)?;

    sqlx::query(
        r#"
        INSERT INTO tenants (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(DEMO_TENANT_NAME)
    .execute(&mut *transaction)
    .await
    .map_err(|error| storage("seed demo tenant", error))?;

    sqlx::query(
        r#"
        INSERT INTO principals (id, tenant_id, display_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(admin_id)
    .bind(tenant_id)
    .bind(DEMO_ADMIN_DISPLAY_NAME)
    .execute(&mut *transaction)
    .await
    .map_err(|error| storage("seed demo admin", error))?;

    sqlx::query(
        r#"
        INSERT INTO role_assignments (id, tenant_id, principal_id, role_type, assigned_by)
        VALUES ($1, $2, $3, $4, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(assignment_id)
    .bind(tenant_id)
    .bind(admin_id)
    .bind(SystemRole::Admin.as_str())
    .execute(&mut *transaction)
    .await
    .map_err(|error| storage("seed demo admin assignment", error))?;

    transaction
        .commit()
        .await
        .map_err(|error| storage("commit seed transaction", error))?;

    info!(
        permissions = definitions.len(),
        system_role_grants = grant_count,
        tenant_id = %tenant_id,
        admin_id = %admin_id,
        "seed completed"
    );

    Ok(())
}

fn parse_seed_uuid(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|error| AppError::Validation(format!("invalid seed id '{value}': {error}")))
}

fn storage(action: &str, error: sqlx::Error) -> AppError {
    AppError::StorageFailure(format!("failed to {action}: {error}"))
}
