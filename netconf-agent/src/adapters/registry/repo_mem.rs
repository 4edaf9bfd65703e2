use crate::domain::session::{AgentSession, SessionId};
use crate::ports::SessionRegistry;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemorySessionRegistry {
    inner: RwLock<HashMap<SessionId, AgentSession>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn insert(&self, session: AgentSession) {
        self.inner.write().await.insert(session.id(), session);
    }

    async fn update(&self, session: AgentSession) {
        self.inner.write().await.insert(session.id(), session);
    }

    async fn get(&self, id: SessionId) -> Option<AgentSession> {
        self.inner.read().await.get(&id).cloned()
    }

    async fn remove(&self, id: SessionId) {
        self.inner.write().await.remove(&id);
    }
}
