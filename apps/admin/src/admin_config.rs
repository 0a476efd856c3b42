use std::env;
use std::str::FromStr;

use rolegate_core::{AppError, PrincipalId, TenantId};
use rolegate_domain::{RoleHierarchy, SystemRole};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const USAGE: &str = "usage: rolegate-admin <migrate | seed | catalog <tenant> [permission] \
                     | resolve <tenant> <principal> | roles <tenant> <actor> [page] [page_size]>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Migrate,
    Seed,
    Catalog {
        tenant_id: TenantId,
        permission: Option<String>,
    },
    Resolve {
        tenant_id: TenantId,
        principal_id: PrincipalId,
    },
    Roles {
        tenant_id: TenantId,
        actor_id: PrincipalId,
        page: usize,
        page_size: usize,
    },
}

impl AdminCommand {
    pub fn parse(args: &[String]) -> Result<Self, AppError> {
        let mut args = args.iter().map(String::as_str);
        match args.next() {
            Some("migrate") => Ok(Self::Migrate),
            Some("seed") => Ok(Self::Seed),
            Some("catalog") => Ok(Self::Catalog {
                tenant_id: TenantId::from_uuid(parse_uuid_arg("tenant", args.next())?),
                permission: args.next().map(str::to_owned),
            }),
            Some("resolve") => Ok(Self::Resolve {
                tenant_id: TenantId::from_uuid(parse_uuid_arg("tenant", args.next())?),
                principal_id: PrincipalId::from_uuid(parse_uuid_arg("principal", args.next())?),
            }),
            Some("roles") => Ok(Self::Roles {
                tenant_id: TenantId::from_uuid(parse_uuid_arg("tenant", args.next())?),
                actor_id: PrincipalId::from_uuid(parse_uuid_arg("actor", args.next())?),
                page: parse_usize_arg("page", args.next(), 1)?,
                page_size: parse_usize_arg("page_size", args.next(), 50)?,
            }),
            _ => Err(AppError::Validation(USAGE.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub command: AdminCommand,
    pub database_url: String,
    pub max_connections: u32,
    pub hierarchy: RoleHierarchy,
}

impl AdminConfig {
    pub fn load() -> Result<Self, AppError> {
        let args = env::args().skip(1).collect::<Vec<_>>();
        let command = AdminCommand::parse(args.as_slice())?;

        let database_url = required_env("DATABASE_URL")?;
        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value.parse::<u32>().map_err(|error| {
                AppError::Validation(format!(
                    "invalid DATABASE_MAX_CONNECTIONS value '{value}': {error}"
                ))
            })?,
            Err(_) => 10,
        };

        let custom_role_baseline = role_env("CUSTOM_ROLE_BASELINE", SystemRole::Manager)?;
        let management_floor = role_env("ROLE_MANAGEMENT_FLOOR", SystemRole::Admin)?;

        Ok(Self {
            command,
            database_url,
            max_connections,
            hierarchy: RoleHierarchy::new(custom_role_baseline, management_floor),
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn role_env(name: &str, default: SystemRole) -> Result<SystemRole, AppError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => parse_role_setting(name, value.as_str()),
        _ => Ok(default),
    }
}

fn parse_role_setting(name: &str, value: &str) -> Result<SystemRole, AppError> {
    let role = SystemRole::from_str(value).map_err(|_| {
        AppError::Validation(format!("{name} must name a system role, got '{value}'"))
    })?;
    if role == SystemRole::SuperAdmin {
        return Err(AppError::Validation(format!("{name} cannot be SUPER_ADMIN")));
    }
    Ok(role)
}

fn parse_uuid_arg(label: &str, value: Option<&str>) -> Result<Uuid, AppError> {
    let value = value.ok_or_else(|| AppError::Validation(format!("missing <{label}>; {USAGE}")))?;
    Uuid::parse_str(value)
        .map_err(|error| AppError::Validation(format!("invalid {label} id '{value}': {error}")))
}

fn parse_usize_arg(label: &str, value: Option<&str>, default: usize) -> Result<usize, AppError> {
    match value {
        Some(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {label} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use rolegate_core::AppError;
    use rolegate_domain::SystemRole;

    use super::{AdminCommand, parse_role_setting};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn parses_resolve_and_roles_commands() {
        let tenant = "11111111-1111-1111-1111-111111111111";
        let principal = "22222222-2222-2222-2222-222222222222";

        let resolve = AdminCommand::parse(&args(&["resolve", tenant, principal]));
        assert!(matches!(resolve, Ok(AdminCommand::Resolve { .. })));

        let roles = AdminCommand::parse(&args(&["roles", tenant, principal, "2"]));
        assert!(matches!(
            roles,
            Ok(AdminCommand::Roles {
                page: 2,
                page_size: 50,
                ..
            })
        ));
    }

    #[test]
    fn parses_catalog_command_with_optional_permission() {
        let tenant = "11111111-1111-1111-1111-111111111111";

        let catalog = AdminCommand::parse(&args(&["catalog", tenant]));
        assert!(matches!(
            catalog,
            Ok(AdminCommand::Catalog {
                permission: None,
                ..
            })
        ));

        let one = AdminCommand::parse(&args(&["catalog", tenant, "VIEW_USERS"]));
        assert!(matches!(
            one,
            Ok(AdminCommand::Catalog {
                permission: Some(ref value),
                ..
            }) if value == "VIEW_USERS"
        ));
        assert!(matches!(
            AdminCommand::parse(&args(&["catalog"])),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejects_unknown_commands_and_bad_ids() {
        assert!(matches!(
            AdminCommand::parse(&args(&[])),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            AdminCommand::parse(&args(&["resolve", "not-a-uuid", "x"])),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            AdminCommand::parse(&args(&["roles", "11111111-1111-1111-1111-111111111111"])),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn role_settings_accept_display_names_but_not_super_admin() {
        assert_eq!(
            parse_role_setting("CUSTOM_ROLE_BASELINE", "hr manager").ok(),
            Some(SystemRole::HrManager)
        );
        assert!(parse_role_setting("ROLE_MANAGEMENT_FLOOR", "SUPER_ADMIN").is_err());
        assert!(parse_role_setting("ROLE_MANAGEMENT_FLOOR", "owner").is_err());
    }
}
