use super::framing::{encode_message, read_message, Framing, FramingError};
use super::hello::{both_support_chunked, parse_client_hello, render_server_hello};
use super::session::{FramedSession, SessionParams};
use crate::domain::session::{CapabilitySet, SessionId, BASE_1_0, BASE_1_1};
use crate::ports::{EventSource, ProtocolSession, SessionAcceptor, SessionError};
use async_trait::async_trait;
use nix::unistd::{getuid, User};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_HELLO_TIMEOUT: Duration = Duration::from_secs(60);

/// Accepts the single NETCONF session carried by one byte transport, such
/// as the stdin/stdout pair of an SSH subsystem.
pub struct TransportAcceptor<R, W> {
    transport: Mutex<Option<(R, W)>>,
    events: Arc<dyn EventSource>,
    session_id: SessionId,
    hello_timeout: Duration,
    max_message_bytes: usize,
}

impl<R, W> TransportAcceptor<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W, events: Arc<dyn EventSource>) -> Self {
        Self {
            transport: Mutex::new(Some((reader, writer))),
            events,
            session_id: SessionId::for_current_process(),
            hello_timeout: DEFAULT_HELLO_TIMEOUT,
            max_message_bytes: super::framing::DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    pub fn with_max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = limit;
        self
    }
}

/// The agent always speaks both base versions whatever the server lists.
fn advertised(capabilities: &CapabilitySet) -> CapabilitySet {
    let mut advertised =
        CapabilitySet::from_uris([BASE_1_0, BASE_1_1]).unwrap_or_else(|_| CapabilitySet::new());
    for capability in capabilities.iter() {
        advertised.insert(capability.clone());
    }
    advertised
}

fn current_username() -> Option<String> {
    User::from_uid(getuid())
        .ok()
        .flatten()
        .map(|user| user.name)
}

#[async_trait]
impl<R, W> SessionAcceptor for TransportAcceptor<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn accept(
        &self,
        capabilities: &CapabilitySet,
        username: Option<&str>,
    ) -> Result<Arc<dyn ProtocolSession>, SessionError> {
        let (reader, mut writer) = self
            .transport
            .lock()
            .await
            .take()
            .ok_or_else(|| SessionError::Accept("transport already in use".into()))?;
        let server = advertised(capabilities);

        let hello = render_server_hello(&server, self.session_id);
        writer
            .write_all(&encode_message(hello.as_bytes(), Framing::EndOfMessage))
            .await
            .map_err(|err| SessionError::Accept(format!("sending hello: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| SessionError::Accept(format!("sending hello: {err}")))?;

        let mut reader = BufReader::new(reader);
        let message = tokio::time::timeout(
            self.hello_timeout,
            read_message(&mut reader, Framing::EndOfMessage, self.max_message_bytes),
        )
        .await
        .map_err(|_| SessionError::Accept("client hello timed out".into()))?
        .map_err(|err| match err {
            FramingError::Closed => SessionError::Accept("client left before hello".into()),
            other => SessionError::Accept(format!("reading client hello: {other}")),
        })?;
        let client = parse_client_hello(&message)
            .map_err(|err| SessionError::Accept(format!("client hello rejected: {err}")))?;

        let framing = if both_support_chunked(&server, &client) {
            Framing::Chunked
        } else {
            Framing::EndOfMessage
        };
        let negotiated = server.negotiate(&client);
        debug!(
            session_id = %self.session_id,
            capabilities = ?negotiated.to_uris(),
            ?framing,
            "hello exchange complete"
        );

        let username = username.map(str::to_string).or_else(current_username);
        info!(
            session_id = %self.session_id,
            username = username.as_deref().unwrap_or("-"),
            "netconf session established"
        );
        let session = FramedSession::new(
            SessionParams {
                id: self.session_id,
                username,
                capabilities: negotiated,
                framing,
                max_message_bytes: self.max_message_bytes,
            },
            reader,
            writer,
            Arc::clone(&self.events),
        );
        Ok(Arc::new(session))
    }
}
