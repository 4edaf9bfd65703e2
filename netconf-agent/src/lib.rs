pub mod adapters;
pub mod app;
pub mod domain;
pub mod ports;

use crate::adapters::backend::unix::DEFAULT_BACKEND_SOCKET;
use crate::adapters::backend::UnixBackendConnector;
use crate::adapters::events::{IdleEventSource, UnixEventSource};
use crate::adapters::netconf::acceptor::DEFAULT_HELLO_TIMEOUT;
use crate::adapters::netconf::framing::DEFAULT_MAX_MESSAGE_BYTES;
use crate::adapters::netconf::TransportAcceptor;
use crate::adapters::registry::{FileSessionRegistry, InMemorySessionRegistry};
use crate::app::bootstrap::Bootstrap;
use crate::app::event_loop::{EventLoop, LoopExit, LoopTimings};
use crate::app::shutdown::ShutdownCoordinator;
use crate::ports::{EventSource, SessionRegistry};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_socket: PathBuf,
    /// Without an event socket subscriptions stay open but silent.
    pub event_socket: Option<PathBuf>,
    /// Stream names the event socket serves; empty means just `NETCONF`.
    pub event_streams: Vec<String>,
    /// Without a state directory the session registry lives in memory.
    pub state_dir: Option<PathBuf>,
    pub poll_timeout: Duration,
    pub teardown_grace: Duration,
    pub hello_timeout: Duration,
    /// Largest framed message accepted from the client.
    pub max_message_bytes: usize,
    /// Client certificate subject asserted by a TLS front end.
    pub transport_identity: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let timings = LoopTimings::default();
        Self {
            backend_socket: PathBuf::from(DEFAULT_BACKEND_SOCKET),
            event_socket: None,
            event_streams: Vec::new(),
            state_dir: None,
            poll_timeout: timings.poll_timeout,
            teardown_grace: timings.teardown_grace,
            hello_timeout: DEFAULT_HELLO_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            transport_identity: None,
        }
    }
}

/// Serves one NETCONF session on the process's stdin/stdout, as an SSH
/// subsystem or a TLS terminator's child process does.
pub async fn run(settings: Settings, shutdown: ShutdownCoordinator) -> anyhow::Result<LoopExit> {
    run_with_transport(settings, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
}

/// Serves one NETCONF session over an arbitrary byte transport. Handshake
/// failures come back as `Err`; everything after that is a [`LoopExit`].
pub async fn run_with_transport<R, W>(
    settings: Settings,
    reader: R,
    writer: W,
    shutdown: ShutdownCoordinator,
) -> anyhow::Result<LoopExit>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let registry: Arc<dyn SessionRegistry> = match &settings.state_dir {
        Some(dir) => Arc::new(
            FileSessionRegistry::new(dir.clone())
                .with_context(|| format!("preparing state directory {}", dir.display()))?,
        ),
        None => Arc::new(InMemorySessionRegistry::new()),
    };
    let events: Arc<dyn EventSource> = match &settings.event_socket {
        Some(path) => Arc::new(
            UnixEventSource::new(path.clone()).with_streams(settings.event_streams.clone()),
        ),
        None => Arc::new(IdleEventSource::new()),
    };

    let connector = UnixBackendConnector::new(settings.backend_socket.clone());
    let acceptor = TransportAcceptor::new(reader, writer, events)
        .with_hello_timeout(settings.hello_timeout)
        .with_max_message_bytes(settings.max_message_bytes);
    let established = Bootstrap::new(&connector, &acceptor, Arc::clone(&registry))
        .with_transport_identity(settings.transport_identity.clone())
        .run()
        .await
        .context("session handshake failed")?;
    info!(
        backend = %settings.backend_socket.display(),
        session_id = %established.record.id(),
        "serving session"
    );

    let timings = LoopTimings {
        poll_timeout: settings.poll_timeout,
        teardown_grace: settings.teardown_grace,
    };
    let exit = EventLoop::new(
        established.session,
        established.backend,
        established.record,
        registry,
        shutdown,
        timings,
    )
    .run()
    .await;
    Ok(exit)
}
