use super::events::{SessionDomainEvent, SessionEventEnvelope};
use super::subscription::SubscriptionSlot;
use super::value_object::{CapabilitySet, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Working,
    Terminating,
    Terminated,
}

impl SessionStatus {
    pub fn is_working(self) -> bool {
        matches!(self, SessionStatus::Working)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub in_rpcs: u64,
    pub in_bad_rpcs: u64,
    pub out_rpc_errors: u64,
    pub subscriptions: u64,
}

/// Agent-side record of an accepted session, kept for monitoring.
///
/// The transport-level lifecycle lives in the protocol session; the event
/// loop mirrors it here through [`AgentSession::observe_status`].
#[derive(Clone, Debug)]
pub struct AgentSession {
    id: SessionId,
    username: Option<String>,
    capabilities: CapabilitySet,
    status: SessionStatus,
    login_time: DateTime<Utc>,
    counters: SessionCounters,
    subscription: SubscriptionSlot,
}

impl AgentSession {
    pub fn establish(
        id: SessionId,
        username: Option<String>,
        capabilities: CapabilitySet,
    ) -> (Self, SessionEventEnvelope) {
        let session = Self {
            id,
            username: username.clone(),
            capabilities: capabilities.clone(),
            status: SessionStatus::Working,
            login_time: Utc::now(),
            counters: SessionCounters::default(),
            subscription: SubscriptionSlot::new(),
        };
        let envelope = SessionEventEnvelope::new(
            id,
            SessionDomainEvent::SessionEstablished {
                username,
                capabilities: capabilities.to_uris(),
            },
        );
        (session, envelope)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn login_time(&self) -> DateTime<Utc> {
        self.login_time
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn subscription(&self) -> &SubscriptionSlot {
        &self.subscription
    }

    pub fn observe_status(&mut self, status: SessionStatus) {
        if self.status != SessionStatus::Terminated {
            self.status = status;
        }
    }

    pub fn record_rpc(
        &mut self,
        operation: &str,
        failed: bool,
    ) -> Result<SessionEventEnvelope, String> {
        if matches!(self.status, SessionStatus::Terminated) {
            return Err("rpc recorded on terminated session".into());
        }
        self.counters.in_rpcs += 1;
        if failed {
            self.counters.out_rpc_errors += 1;
        }
        Ok(SessionEventEnvelope::new(
            self.id,
            SessionDomainEvent::RpcHandled {
                operation: operation.to_string(),
                failed,
            },
        ))
    }

    pub fn record_bad_rpc(&mut self) -> SessionEventEnvelope {
        self.counters.in_bad_rpcs += 1;
        SessionEventEnvelope::new(self.id, SessionDomainEvent::RpcRejected)
    }

    pub fn record_subscription(&mut self) -> SessionEventEnvelope {
        self.counters.subscriptions += 1;
        SessionEventEnvelope::new(self.id, SessionDomainEvent::SubscriptionStarted)
    }

    pub fn close(&mut self, reason: impl Into<String>) -> Result<SessionEventEnvelope, String> {
        if matches!(self.status, SessionStatus::Terminated) {
            return Err("session already closed".into());
        }
        self.status = SessionStatus::Terminated;
        Ok(SessionEventEnvelope::new(
            self.id,
            SessionDomainEvent::SessionClosed {
                reason: reason.into(),
            },
        ))
    }

    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            username: self.username.clone(),
            capabilities: self.capabilities.clone(),
            status: self.status,
            login_time: self.login_time,
            counters: self.counters,
        }
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let SessionSnapshot {
            id,
            username,
            capabilities,
            status,
            login_time,
            counters,
        } = snapshot;
        Self {
            id,
            username,
            capabilities,
            status,
            login_time,
            counters,
            subscription: SubscriptionSlot::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub username: Option<String>,
    pub capabilities: CapabilitySet,
    pub status: SessionStatus,
    pub login_time: DateTime<Utc>,
    pub counters: SessionCounters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::value_object::BASE_1_0;

    fn mk_session() -> AgentSession {
        let caps = CapabilitySet::from_uris([BASE_1_0]).unwrap();
        AgentSession::establish(SessionId::new(11).unwrap(), Some("alice".into()), caps).0
    }

    #[test]
    fn establish_emits_event_and_starts_working() {
        let caps = CapabilitySet::from_uris([BASE_1_0]).unwrap();
        let (session, event) =
            AgentSession::establish(SessionId::new(5).unwrap(), None, caps.clone());
        assert!(session.status().is_working());
        assert_eq!(
            event.event,
            SessionDomainEvent::SessionEstablished {
                username: None,
                capabilities: caps.to_uris(),
            }
        );
    }

    #[test]
    fn counters_track_outcomes() {
        let mut session = mk_session();
        session.record_rpc("get-config", false).unwrap();
        session.record_rpc("edit-config", true).unwrap();
        session.record_bad_rpc();
        let counters = session.counters();
        assert_eq!(counters.in_rpcs, 2);
        assert_eq!(counters.out_rpc_errors, 1);
        assert_eq!(counters.in_bad_rpcs, 1);
    }

    #[test]
    fn close_is_terminal() {
        let mut session = mk_session();
        session.observe_status(SessionStatus::Terminating);
        assert_eq!(session.status(), SessionStatus::Terminating);
        let event = session.close("close-session").unwrap();
        assert!(matches!(
            event.event,
            SessionDomainEvent::SessionClosed { .. }
        ));
        assert!(session.close("again").is_err());
        assert!(session.record_rpc("get", false).is_err());
        session.observe_status(SessionStatus::Working);
        assert_eq!(session.status(), SessionStatus::Terminated);
    }

    #[test]
    fn snapshot_round_trip_keeps_counters() {
        let mut session = mk_session();
        session.record_rpc("get", false).unwrap();
        let restored = AgentSession::from_snapshot(session.to_snapshot());
        assert_eq!(restored.counters(), session.counters());
        assert_eq!(restored.username(), Some("alice"));
        assert!(!restored.subscription().is_active());
    }
}
