use crate::domain::rpc::{Reply, RpcUnit};
use crate::domain::session::{CapabilitySet, SessionId, SessionStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Result of one bounded readiness wait on the session transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Timeout,
    /// The wait was cut short by signal delivery; not an error.
    Interrupted,
    DataReady,
    HangUp,
    IoError(String),
}

/// Result of pulling one message after readiness was reported.
#[derive(Clone, Debug, PartialEq)]
pub enum Received {
    /// Nothing to hand over: no complete message yet, or the library
    /// already answered it internally.
    Nothing,
    /// The message was not a usable `<rpc>`.
    Unknown,
    /// The peer closed the transport between messages.
    HangUp,
    Rpc(RpcUnit),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session acceptance failed: {0}")]
    Accept(String),
    #[error("readiness wait failed: {0}")]
    Wait(String),
    #[error("transport write failed: {0}")]
    Write(String),
    #[error("session already terminated")]
    Terminated,
}

/// An accepted NETCONF session as seen by the event loop.
///
/// Shared between the event loop and at most one notification delivery
/// task; only the event loop calls `set_status`, `receive_rpc` and `close`.
#[async_trait]
pub trait ProtocolSession: Send + Sync {
    fn id(&self) -> SessionId;

    fn username(&self) -> Option<String>;

    fn capabilities(&self) -> CapabilitySet;

    fn status(&self) -> SessionStatus;

    fn set_status(&self, status: SessionStatus);

    fn capability_enabled(&self, uri: &str) -> bool {
        self.capabilities().contains(uri)
    }

    /// Whether the negotiated session permits notification subscriptions.
    fn notifications_allowed(&self) -> bool;

    async fn wait_ready(&self, timeout: Duration) -> Result<Readiness, SessionError>;

    async fn receive_rpc(&self) -> Received;

    async fn send_reply(&self, rpc: &RpcUnit, reply: &Reply) -> Result<(), SessionError>;

    /// Validates `create-subscription` parameters; `Reply::Ok` when valid.
    async fn check_subscription(&self, rpc: &RpcUnit) -> Reply;

    /// Streams notifications for `subscribe` until the stream ends or the
    /// session is torn down. Returns the number of notifications sent.
    async fn dispatch_notifications(&self, subscribe: &RpcUnit) -> u64;

    async fn close(&self);
}

#[async_trait]
pub trait SessionAcceptor: Send + Sync {
    async fn accept(
        &self,
        capabilities: &CapabilitySet,
        username: Option<&str>,
    ) -> Result<Arc<dyn ProtocolSession>, SessionError>;
}
