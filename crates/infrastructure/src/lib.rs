//! Infrastructure adapters for authorization ports.

#![forbid(unsafe_code)]

mod in_memory_authorization_store;
mod postgres_audit_repository;
mod postgres_authorization_repository;
mod postgres_grant_columns;
mod postgres_security_admin_repository;

pub use in_memory_authorization_store::InMemoryAuthorizationStore;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_authorization_repository::PostgresAuthorizationRepository;
pub use postgres_security_admin_repository::PostgresSecurityAdminRepository;
