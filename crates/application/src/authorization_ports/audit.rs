use async_trait::async_trait;
use rolegate_core::{AppResult, TenantId};
use rolegate_domain::AuditAction;
use tracing::error;

/// Immutable audit event payload emitted by authorization mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Tenant scope for the event.
    pub tenant_id: TenantId,
    /// Principal that performed the action.
    pub subject: String,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Optional audit detail payload.
    pub detail: Option<String>,
    /// Snapshot before the mutation.
    pub before: Option<serde_json::Value>,
    /// Snapshot after the mutation.
    pub after: Option<serde_json::Value>,
}

/// Port for persisting append-only audit events.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persists one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}

/// Appends an audit event for a write that has already committed.
///
/// The mutation stands either way, so a failed append is logged and not
/// reported to the caller.
pub(crate) async fn record_committed_event(repository: &dyn AuditRepository, event: AuditEvent) {
    let tenant_id = event.tenant_id;
    let action = event.action;
    let resource_id = event.resource_id.clone();

    if let Err(error) = repository.append_event(event).await {
        error!(
            tenant_id = %tenant_id,
            action = action.as_str(),
            resource_id = %resource_id,
            error = %error,
            "failed to append audit event"
        );
    }
}
