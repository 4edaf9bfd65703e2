use super::value_object::SessionId;
use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq)]
pub enum SessionDomainEvent {
    SessionEstablished {
        username: Option<String>,
        capabilities: Vec<String>,
    },
    RpcHandled {
        operation: String,
        failed: bool,
    },
    RpcRejected,
    SubscriptionStarted,
    SessionClosed {
        reason: String,
    },
}

impl SessionDomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionDomainEvent::SessionEstablished { .. } => "netconf.session.established",
            SessionDomainEvent::RpcHandled { .. } => "netconf.rpc.handled",
            SessionDomainEvent::RpcRejected => "netconf.rpc.rejected",
            SessionDomainEvent::SubscriptionStarted => "netconf.subscription.started",
            SessionDomainEvent::SessionClosed { .. } => "netconf.session.closed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionEventEnvelope {
    pub session_id: SessionId,
    pub occurred_at: DateTime<Utc>,
    pub event: SessionDomainEvent,
}

impl SessionEventEnvelope {
    pub fn new(session_id: SessionId, event: SessionDomainEvent) -> Self {
        Self {
            session_id,
            occurred_at: Utc::now(),
            event,
        }
    }
}
