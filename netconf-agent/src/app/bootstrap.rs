use crate::app::identity::{username_from_dn, IdentityError};
use crate::app::journal;
use crate::app::privilege::{drop_privileges, PrivilegeError, PrivilegeOutcome};
use crate::domain::session::{AgentSession, CapabilitySet};
use crate::ports::{
    BackendConnection, BackendConnector, BackendError, ProtocolSession, SessionAcceptor,
    SessionError, SessionInfo, SessionRegistry,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("cannot connect to the management server: {0}")]
    Connect(#[source] BackendError),
    #[error("cannot obtain server capabilities: {0}")]
    Capabilities(String),
    #[error("cannot identify the client: {0}")]
    Identity(#[from] IdentityError),
    #[error("session not accepted: {0}")]
    Accept(#[from] SessionError),
    #[error("session info exchange failed: {0}")]
    SessionInfo(#[source] BackendError),
}

pub type PrivilegeDrop = fn(&str) -> Result<PrivilegeOutcome, PrivilegeError>;

/// Everything the event loop needs once the handshake is complete.
pub struct Established {
    pub session: Arc<dyn ProtocolSession>,
    pub backend: Box<dyn BackendConnection>,
    pub record: AgentSession,
}

/// Runs the handshake sequence. Every step except the privilege switch is
/// fatal; there is no retry.
pub struct Bootstrap<'a> {
    connector: &'a dyn BackendConnector,
    acceptor: &'a dyn SessionAcceptor,
    registry: Arc<dyn SessionRegistry>,
    transport_identity: Option<String>,
    privilege_drop: PrivilegeDrop,
}

impl<'a> Bootstrap<'a> {
    pub fn new(
        connector: &'a dyn BackendConnector,
        acceptor: &'a dyn SessionAcceptor,
        registry: Arc<dyn SessionRegistry>,
    ) -> Self {
        Self {
            connector,
            acceptor,
            registry,
            transport_identity: None,
            privilege_drop: drop_privileges,
        }
    }

    /// Subject of the client certificate as passed in by a TLS terminator.
    pub fn with_transport_identity(mut self, subject: Option<String>) -> Self {
        self.transport_identity = subject;
        self
    }

    pub fn with_privilege_drop(mut self, privilege_drop: PrivilegeDrop) -> Self {
        self.privilege_drop = privilege_drop;
        self
    }

    pub async fn run(self) -> Result<Established, BootstrapError> {
        let mut backend = self
            .connector
            .connect()
            .await
            .map_err(BootstrapError::Connect)?;

        let uris = backend
            .capabilities()
            .await
            .map_err(|err| BootstrapError::Capabilities(err.to_string()))?;
        let capabilities =
            CapabilitySet::from_uris(uris).map_err(BootstrapError::Capabilities)?;
        if capabilities.is_empty() {
            return Err(BootstrapError::Capabilities(
                "server advertised no capabilities".into(),
            ));
        }

        let identity = self
            .transport_identity
            .as_deref()
            .map(username_from_dn)
            .transpose()?;

        let session = self
            .acceptor
            .accept(&capabilities, identity.as_deref())
            .await?;
        let session_id = session.id();
        let username = session.username().or(identity);
        info!(%session_id, username = username.as_deref().unwrap_or("-"), "session accepted");

        if let Some(user) = username.as_deref() {
            match (self.privilege_drop)(user) {
                Ok(PrivilegeOutcome::Switched { uid, gid }) => {
                    info!(%session_id, uid, gid, "switched to client privileges")
                }
                Ok(PrivilegeOutcome::Unprivileged) => {}
                Err(err) => {
                    warn!(%session_id, error = %err, "keeping agent privileges")
                }
            }
        }

        let (record, established) =
            AgentSession::establish(session_id, username.clone(), session.capabilities());
        journal::record(&established);
        self.registry.insert(record.clone()).await;

        let info = SessionInfo {
            session_id,
            username,
            capabilities: session.capabilities().to_uris(),
        };
        if let Err(err) = backend.exchange_session_info(&info).await {
            self.registry.remove(session_id).await;
            session.close().await;
            return Err(BootstrapError::SessionInfo(err));
        }

        Ok(Established {
            session,
            backend,
            record,
        })
    }
}
