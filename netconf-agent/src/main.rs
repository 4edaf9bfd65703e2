use clap::Parser;
use netconf_agent::adapters::backend::unix::DEFAULT_BACKEND_SOCKET;
use netconf_agent::adapters::netconf::framing::DEFAULT_MAX_MESSAGE_BYTES;
use netconf_agent::app::identity::TLS_CLIENT_DN_ENV;
use netconf_agent::app::shutdown::{spawn_signal_listeners, ShutdownCoordinator};
use netconf_agent::{run, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "NETCONF agent serving one session on stdin/stdout",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        env = "NETCONF_AGENT_BACKEND_SOCKET",
        default_value = DEFAULT_BACKEND_SOCKET,
        help = "Unix socket of the management server"
    )]
    backend_socket: PathBuf,

    #[arg(
        long,
        env = "NETCONF_AGENT_EVENT_SOCKET",
        value_name = "PATH",
        help = "Unix socket serving notification streams"
    )]
    event_socket: Option<PathBuf>,

    #[arg(
        long = "event-stream",
        env = "NETCONF_AGENT_EVENT_STREAMS",
        value_delimiter = ',',
        value_name = "NAME",
        help = "Notification stream served by the event socket (repeatable)"
    )]
    event_streams: Vec<String>,

    #[arg(
        long,
        env = "NETCONF_AGENT_POLL_TIMEOUT_MS",
        default_value_t = 500,
        help = "Readiness wait timeout in milliseconds"
    )]
    poll_timeout_ms: u64,

    #[arg(
        long,
        env = "NETCONF_AGENT_STATE_DIR",
        value_name = "DIR",
        help = "Directory for session monitoring snapshots"
    )]
    state_dir: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = 1000,
        help = "How long teardown waits for notification delivery, in milliseconds"
    )]
    teardown_grace_ms: u64,

    #[arg(
        long,
        env = "NETCONF_AGENT_HELLO_TIMEOUT_MS",
        default_value_t = 60_000,
        help = "How long to wait for the client hello, in milliseconds"
    )]
    hello_timeout_ms: u64,

    #[arg(
        long,
        env = "NETCONF_AGENT_MAX_MESSAGE_BYTES",
        default_value_t = DEFAULT_MAX_MESSAGE_BYTES,
        help = "Largest client message accepted, in bytes"
    )]
    max_message_bytes: usize,
}

impl Cli {
    fn into_settings(self, transport_identity: Option<String>) -> Settings {
        Settings {
            backend_socket: self.backend_socket,
            event_socket: self.event_socket,
            event_streams: self.event_streams,
            state_dir: self.state_dir,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            teardown_grace: Duration::from_millis(self.teardown_grace_ms),
            hello_timeout: Duration::from_millis(self.hello_timeout_ms),
            max_message_bytes: self.max_message_bytes,
            transport_identity,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let transport_identity = std::env::var(TLS_CLIENT_DN_ENV)
        .ok()
        .filter(|subject| !subject.is_empty());
    let settings = cli.into_settings(transport_identity);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "cannot start async runtime");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(async {
        let shutdown = ShutdownCoordinator::new();
        if let Err(err) = spawn_signal_listeners(&shutdown) {
            error!(error = %err, "cannot install signal handlers");
            return ExitCode::FAILURE;
        }
        match run(settings, shutdown).await {
            Ok(exit) => exit.exit_code(),
            Err(err) => {
                error!(error = %format!("{err:#}"), "agent failed");
                ExitCode::FAILURE
            }
        }
    });
    // A pending stdin read cannot be cancelled; do not wait for it.
    runtime.shutdown_timeout(Duration::from_millis(100));
    code
}
