use crate::domain::rpc::SubscriptionRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// One event produced by the management server's notification streams.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_time: DateTime<Utc>,
    /// Pre-encoded notification content.
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    #[error("event source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("event source i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type EventStream = BoxStream<'static, Result<EventRecord, EventSourceError>>;

/// Opens a per-subscription event feed. Implementations must not share
/// state with the backend connection used by the event loop.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn streams(&self) -> Vec<String>;

    async fn open(&self, request: &SubscriptionRequest) -> Result<EventStream, EventSourceError>;
}
