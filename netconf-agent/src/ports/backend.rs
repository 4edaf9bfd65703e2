use crate::domain::rpc::{Reply, RpcUnit};
use crate::domain::session::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("management server unreachable: {0}")]
    Unreachable(String),
    #[error("backend protocol violation: {0}")]
    Protocol(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("backend i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Session metadata handed to the management server after the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub username: Option<String>,
    pub capabilities: Vec<String>,
}

#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>, BackendError>;
}

/// Trusted request/response channel to the management server.
///
/// Methods take `&mut self`: the connection belongs to the event loop and
/// is never reachable from notification delivery.
#[async_trait]
pub trait BackendConnection: Send {
    async fn capabilities(&mut self) -> Result<Vec<String>, BackendError>;

    async fn exchange_session_info(&mut self, info: &SessionInfo) -> Result<(), BackendError>;

    /// Relays an operation the agent does not handle itself. Transport
    /// failures come back as an error reply, never as `Err`.
    async fn forward_operation(&mut self, session: SessionId, rpc: &RpcUnit) -> Reply;

    async fn close(&mut self, session: SessionId) -> Result<(), BackendError>;

    async fn kill_session(&mut self, session: SessionId, target: &str) -> Reply;
}
