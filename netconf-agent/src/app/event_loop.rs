//! The per-session control loop.
//!
//! One iteration: consult the shutdown coordinator, wait a bounded time for
//! transport readiness, pull at most one RPC, dispatch it and send exactly
//! one reply. RPCs are never pipelined; the next read starts only after the
//! previous reply went out.

use crate::app::dispatcher::RpcDispatcher;
use crate::app::journal;
use crate::app::notification::NotificationTask;
use crate::app::shutdown::ShutdownCoordinator;
use crate::domain::rpc::RpcUnit;
use crate::domain::session::AgentSession;
use crate::ports::{BackendConnection, ProtocolSession, Readiness, Received, SessionRegistry};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LoopError {
    #[error("readiness wait failed: {0}")]
    Wait(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("session no longer usable after an undecodable message")]
    Unusable,
}

/// Why the loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// Cooperative shutdown after a terminating signal.
    Shutdown,
    /// The session left working status, normally through close-session.
    Closed,
    /// The client disconnected.
    HungUp,
    Fatal(LoopError),
}

impl LoopExit {
    pub fn is_success(&self) -> bool {
        !matches!(self, LoopExit::Fatal(_))
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    fn reason(&self) -> String {
        match self {
            LoopExit::Shutdown => "shutdown".into(),
            LoopExit::Closed => "closed".into(),
            LoopExit::HungUp => "hang-up".into(),
            LoopExit::Fatal(err) => err.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LoopTimings {
    pub poll_timeout: Duration,
    pub teardown_grace: Duration,
}

impl Default for LoopTimings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
            teardown_grace: Duration::from_millis(1000),
        }
    }
}

pub struct EventLoop {
    session: Arc<dyn ProtocolSession>,
    backend: Box<dyn BackendConnection>,
    record: AgentSession,
    registry: Arc<dyn SessionRegistry>,
    shutdown: ShutdownCoordinator,
    timings: LoopTimings,
    notifications: Option<NotificationTask>,
}

impl EventLoop {
    pub fn new(
        session: Arc<dyn ProtocolSession>,
        backend: Box<dyn BackendConnection>,
        record: AgentSession,
        registry: Arc<dyn SessionRegistry>,
        shutdown: ShutdownCoordinator,
        timings: LoopTimings,
    ) -> Self {
        Self {
            session,
            backend,
            record,
            registry,
            shutdown,
            timings,
            notifications: None,
        }
    }

    /// Runs until the session ends, then releases everything it holds.
    pub async fn run(mut self) -> LoopExit {
        let exit = self.drive().await;
        let session_id = self.record.id();
        match &exit {
            LoopExit::Fatal(err) => error!(%session_id, error = %err, "session loop failed"),
            other => info!(%session_id, reason = %other.reason(), "session loop finished"),
        }
        self.cleanup(&exit).await;
        exit
    }

    async fn drive(&mut self) -> LoopExit {
        loop {
            if self.shutdown.is_requested() {
                return LoopExit::Shutdown;
            }
            let status = self.session.status();
            self.record.observe_status(status);
            if !status.is_working() {
                return LoopExit::Closed;
            }

            match self.session.wait_ready(self.timings.poll_timeout).await {
                Err(err) => return LoopExit::Fatal(LoopError::Wait(err.to_string())),
                Ok(Readiness::Timeout) | Ok(Readiness::Interrupted) => continue,
                Ok(Readiness::HangUp) => return self.hang_up().await,
                Ok(Readiness::IoError(err)) => return LoopExit::Fatal(LoopError::Transport(err)),
                Ok(Readiness::DataReady) => {}
            }

            match self.session.receive_rpc().await {
                Received::Nothing => {}
                Received::HangUp => return self.hang_up().await,
                Received::Unknown => {
                    journal::record(&self.record.record_bad_rpc());
                    self.registry.update(self.record.clone()).await;
                    if !self.session.status().is_working() {
                        return LoopExit::Fatal(LoopError::Unusable);
                    }
                    debug!(session_id = %self.session.id(), "ignoring undecodable message");
                }
                Received::Rpc(rpc) => self.handle(rpc).await,
            }
        }
    }

    /// The client went away: drop the server-side session record too.
    async fn hang_up(&mut self) -> LoopExit {
        let session_id = self.session.id();
        info!(%session_id, "client hung up");
        if let Err(err) = self.backend.close(session_id).await {
            warn!(%session_id, error = %err, "backend failed to close session");
        }
        LoopExit::HungUp
    }

    async fn handle(&mut self, rpc: RpcUnit) {
        let slot = self.record.subscription().clone();
        let dispatch = RpcDispatcher::new(&self.session, self.backend.as_mut(), &slot)
            .dispatch(&rpc)
            .await;
        let failed = !dispatch.reply.is_ok();

        if let Err(err) = self.session.send_reply(&rpc, &dispatch.reply).await {
            warn!(
                session_id = %self.session.id(),
                operation = %rpc.operation(),
                error = %err,
                "failed to send reply"
            );
        }
        if let Some(mut task) = dispatch.notifications {
            task.release();
            journal::record(&self.record.record_subscription());
            self.notifications = Some(task);
        }

        match self.record.record_rpc(rpc.operation().name(), failed) {
            Ok(envelope) => journal::record(&envelope),
            Err(err) => debug!(session_id = %self.record.id(), error = %err, "rpc not recorded"),
        }
        self.registry.update(self.record.clone()).await;
    }

    async fn cleanup(&mut self, exit: &LoopExit) {
        self.session.close().await;
        if let Some(task) = self.notifications.take() {
            if let Some(sent) = task.finish(self.timings.teardown_grace).await {
                debug!(session_id = %self.record.id(), sent, "notification task joined");
            }
        }
        self.registry.remove(self.record.id()).await;
        match self.record.close(exit.reason()) {
            Ok(envelope) => journal::record(&envelope),
            Err(err) => {
                debug!(session_id = %self.record.id(), error = %err, "session already closed")
            }
        }
    }
}
