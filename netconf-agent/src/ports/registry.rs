use crate::domain::session::{AgentSession, SessionId};
use async_trait::async_trait;

/// Monitoring view of live sessions.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn insert(&self, session: AgentSession);
    async fn update(&self, session: AgentSession);
    async fn get(&self, id: SessionId) -> Option<AgentSession>;
    async fn remove(&self, id: SessionId);
}
