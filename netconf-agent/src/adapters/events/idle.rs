use crate::domain::rpc::{SubscriptionRequest, DEFAULT_STREAM};
use crate::ports::{EventSource, EventSourceError, EventStream};
use async_trait::async_trait;
use futures::StreamExt;

/// Event source used when no management-side event feed is configured:
/// the default stream exists but never produces anything.
#[derive(Debug, Default, Clone)]
pub struct IdleEventSource;

impl IdleEventSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSource for IdleEventSource {
    fn streams(&self) -> Vec<String> {
        vec![DEFAULT_STREAM.to_string()]
    }

    async fn open(&self, _request: &SubscriptionRequest) -> Result<EventStream, EventSourceError> {
        Ok(futures::stream::pending().boxed())
    }
}
