use crate::domain::session::{SessionDomainEvent, SessionEventEnvelope};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Renders a session event as its kind plus a structured payload.
pub fn event_payload(envelope: &SessionEventEnvelope) -> (&'static str, Value) {
    let kind = envelope.event.kind();
    let session_id = envelope.session_id.get();
    let occurred_at = envelope.occurred_at.to_rfc3339();
    let payload = match &envelope.event {
        SessionDomainEvent::SessionEstablished {
            username,
            capabilities,
        } => json!({
            "session_id": session_id,
            "username": username,
            "capabilities": capabilities,
            "occurred_at": occurred_at,
        }),
        SessionDomainEvent::RpcHandled { operation, failed } => json!({
            "session_id": session_id,
            "operation": operation,
            "failed": failed,
        }),
        SessionDomainEvent::RpcRejected | SessionDomainEvent::SubscriptionStarted => json!({
            "session_id": session_id,
            "occurred_at": occurred_at,
        }),
        SessionDomainEvent::SessionClosed { reason } => json!({
            "session_id": session_id,
            "reason": reason,
            "occurred_at": occurred_at,
        }),
    };
    (kind, payload)
}

/// Emits the event to the log. Per-rpc events go out at debug level.
pub fn record(envelope: &SessionEventEnvelope) {
    let (kind, payload) = event_payload(envelope);
    match envelope.event {
        SessionDomainEvent::RpcHandled { .. } => debug!(kind, %payload, "session event"),
        _ => info!(kind, %payload, "session event"),
    }
}
