//! Rolegate administration command-line entry point.

#![forbid(unsafe_code)]

mod admin_config;
mod seed;

use std::sync::Arc;

use rolegate_application::AccessControlService;
use rolegate_core::{ActorContext, AppError, AppResult};
use rolegate_domain::PermissionKey;
use rolegate_infrastructure::{
    PostgresAuditRepository, PostgresAuthorizationRepository, PostgresSecurityAdminRepository,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::admin_config::{AdminCommand, AdminConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AdminConfig::load()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| {
            AppError::StorageFailure(format!("failed to connect to database: {error}"))
        })?;

    match config.command.clone() {
        AdminCommand::Migrate => run_migrations(&pool).await,
        AdminCommand::Seed => {
            run_migrations(&pool).await?;
            seed::run(&pool).await
        }
        AdminCommand::Catalog {
            tenant_id,
            permission,
        } => {
            let catalog = build_service(pool, &config)
                .permission_catalog(tenant_id)
                .await?;
            match permission {
                Some(value) => {
                    let key = PermissionKey::parse(value.as_str())?;
                    let definition = catalog.describe(&key).ok_or_else(|| {
                        AppError::NotFound(format!("permission '{key}' is not in the catalog"))
                    })?;
                    print_json(definition)
                }
                None => print_json(&catalog.grouped_by_resource()),
            }
        }
        AdminCommand::Resolve {
            tenant_id,
            principal_id,
        } => {
            let map = build_service(pool, &config)
                .resolve_effective_permissions(tenant_id, principal_id)
                .await?;
            print_json(&map)
        }
        AdminCommand::Roles {
            tenant_id,
            actor_id,
            page,
            page_size,
        } => {
            let actor = ActorContext::new(actor_id, tenant_id);
            let (roles, total) = build_service(pool, &config)
                .list_visible_roles(tenant_id, &actor, page, page_size)
                .await?;
            print_json(&serde_json::json!({
                "page": page,
                "page_size": page_size,
                "total": total,
                "roles": roles,
            }))
        }
    }
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::StorageFailure(format!("failed to run migrations: {error}")))?;

    info!("database migrations applied");
    Ok(())
}

fn build_service(pool: PgPool, config: &AdminConfig) -> AccessControlService {
    let authorization_repository = Arc::new(PostgresAuthorizationRepository::new(pool.clone()));
    let security_admin_repository = Arc::new(PostgresSecurityAdminRepository::new(pool.clone()));
    let audit_repository = Arc::new(PostgresAuditRepository::new(pool));

    AccessControlService::new(
        config.hierarchy,
        authorization_repository,
        security_admin_repository,
        audit_repository,
    )
}

fn print_json(value: &impl serde::Serialize) -> AppResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|error| AppError::Validation(format!("failed to render output: {error}")))?;
    println!("{rendered}");
    Ok(())
}
