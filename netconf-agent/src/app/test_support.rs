//! Port fakes shared by the app-layer unit tests.

use crate::domain::rpc::{ErrorTag, Reply, RpcError, RpcUnit};
use crate::domain::session::{CapabilitySet, SessionId, SessionStatus};
use crate::ports::{
    BackendConnection, BackendConnector, BackendError, ProtocolSession, Readiness, Received,
    SessionAcceptor, SessionError, SessionInfo,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const FAKE_SESSION_ID: u32 = 7;

pub fn caps(uris: &[&str]) -> CapabilitySet {
    CapabilitySet::from_uris(uris.iter().copied()).unwrap()
}

/// One scripted transport event. An exhausted script reads as hang-up.
#[derive(Clone, Debug)]
pub enum Step {
    Ready(Readiness),
    WaitError,
    Rpc(RpcUnit),
    Unknown { terminate: bool },
    /// Readiness reported, then a clean end of stream on read.
    Closed,
    Nothing,
}

pub struct FakeSession {
    capabilities: CapabilitySet,
    username: Option<String>,
    status: Mutex<SessionStatus>,
    notifications: AtomicBool,
    token: CancellationToken,
    script: Mutex<VecDeque<Step>>,
    subscription_reply: Mutex<Reply>,
    replies: Mutex<Vec<(Option<String>, Reply)>>,
    pub dispatched: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeSession {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            username: None,
            status: Mutex::new(SessionStatus::Working),
            notifications: AtomicBool::new(true),
            token: CancellationToken::new(),
            script: Mutex::new(VecDeque::new()),
            subscription_reply: Mutex::new(Reply::Ok),
            replies: Mutex::new(Vec::new()),
            dispatched: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    pub fn with_subscription_reply(self, reply: Reply) -> Self {
        *self.subscription_reply.lock().unwrap() = reply;
        self
    }

    pub fn without_notifications(self) -> Self {
        self.notifications.store(false, Ordering::SeqCst);
        self
    }

    pub fn current_status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    pub fn cancel_teardown(&self) {
        self.token.cancel();
    }

    /// Replies sent so far as `(message-id, reply)`.
    pub fn replies(&self) -> Vec<(Option<String>, Reply)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProtocolSession for FakeSession {
    fn id(&self) -> SessionId {
        SessionId::new(FAKE_SESSION_ID).unwrap()
    }

    fn username(&self) -> Option<String> {
        self.username.clone()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    fn status(&self) -> SessionStatus {
        self.current_status()
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().unwrap() = status;
    }

    fn notifications_allowed(&self) -> bool {
        self.notifications.load(Ordering::SeqCst)
    }

    async fn wait_ready(&self, _timeout: Duration) -> Result<Readiness, SessionError> {
        let mut script = self.script.lock().unwrap();
        match script.front() {
            None => Ok(Readiness::HangUp),
            Some(Step::Ready(_)) => match script.pop_front() {
                Some(Step::Ready(readiness)) => Ok(readiness),
                _ => unreachable!(),
            },
            Some(Step::WaitError) => {
                script.pop_front();
                Err(SessionError::Wait("scripted failure".into()))
            }
            Some(_) => Ok(Readiness::DataReady),
        }
    }

    async fn receive_rpc(&self) -> Received {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Rpc(rpc)) => Received::Rpc(rpc),
            Some(Step::Closed) => Received::HangUp,
            Some(Step::Unknown { terminate }) => {
                if terminate {
                    self.set_status(SessionStatus::Terminated);
                }
                Received::Unknown
            }
            _ => Received::Nothing,
        }
    }

    async fn send_reply(&self, rpc: &RpcUnit, reply: &Reply) -> Result<(), SessionError> {
        self.replies
            .lock()
            .unwrap()
            .push((rpc.message_id().map(str::to_string), reply.clone()));
        Ok(())
    }

    async fn check_subscription(&self, _rpc: &RpcUnit) -> Reply {
        self.subscription_reply.lock().unwrap().clone()
    }

    async fn dispatch_notifications(&self, _subscribe: &RpcUnit) -> u64 {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        self.token.cancelled().await;
        0
    }

    async fn close(&self) {
        self.token.cancel();
        self.set_status(SessionStatus::Terminated);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Records every backend call as a short string such as `close:7`.
#[derive(Clone, Debug, Default)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<String>>>,
    capabilities: Vec<String>,
    fail_close: bool,
    fail_session_info: bool,
    forward_reply: Option<Reply>,
}

impl FakeBackend {
    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    pub fn with_capabilities(mut self, uris: &[&str]) -> Self {
        self.capabilities = uris.iter().map(|uri| uri.to_string()).collect();
        self
    }

    pub fn with_forward_reply(mut self, reply: Reply) -> Self {
        self.forward_reply = Some(reply);
        self
    }

    pub fn failing_session_info(mut self) -> Self {
        self.fail_session_info = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BackendConnection for FakeBackend {
    async fn capabilities(&mut self) -> Result<Vec<String>, BackendError> {
        Ok(self.capabilities.clone())
    }

    async fn exchange_session_info(&mut self, info: &SessionInfo) -> Result<(), BackendError> {
        self.log(format!("session-info:{}", info.session_id));
        if self.fail_session_info {
            return Err(BackendError::Rejected("no".into()));
        }
        Ok(())
    }

    async fn forward_operation(&mut self, _session: SessionId, rpc: &RpcUnit) -> Reply {
        self.log(format!("forward:{}", rpc.operation()));
        self.forward_reply.clone().unwrap_or(Reply::Ok)
    }

    async fn close(&mut self, session: SessionId) -> Result<(), BackendError> {
        self.log(format!("close:{session}"));
        if self.fail_close {
            return Err(BackendError::Rejected("close refused".into()));
        }
        Ok(())
    }

    async fn kill_session(&mut self, session: SessionId, target: &str) -> Reply {
        self.log(format!("kill:{session}:{target}"));
        if target == FAKE_SESSION_ID.to_string() {
            return Reply::error(RpcError::new(ErrorTag::InvalidValue));
        }
        Reply::Ok
    }
}

/// Hands out one prepared [`FakeBackend`]; later connects fail.
pub struct FakeConnector {
    backend: Mutex<Option<FakeBackend>>,
}

impl FakeConnector {
    pub fn new(backend: FakeBackend) -> Self {
        Self {
            backend: Mutex::new(Some(backend)),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            backend: Mutex::new(None),
        }
    }
}

#[async_trait]
impl BackendConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>, BackendError> {
        let backend = self.backend.lock().unwrap().take();
        backend
            .map(|backend| Box::new(backend) as Box<dyn BackendConnection>)
            .ok_or_else(|| BackendError::Unreachable("no backend".into()))
    }
}

/// Accepts with a prepared [`FakeSession`], recording what it was offered.
pub struct FakeAcceptor {
    session: Mutex<Option<Arc<FakeSession>>>,
    pub offered: Mutex<Option<(CapabilitySet, Option<String>)>>,
}

impl FakeAcceptor {
    pub fn new(session: Arc<FakeSession>) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            offered: Mutex::new(None),
        }
    }

    pub fn refusing() -> Self {
        Self {
            session: Mutex::new(None),
            offered: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SessionAcceptor for FakeAcceptor {
    async fn accept(
        &self,
        capabilities: &CapabilitySet,
        username: Option<&str>,
    ) -> Result<Arc<dyn ProtocolSession>, SessionError> {
        *self.offered.lock().unwrap() =
            Some((capabilities.clone(), username.map(str::to_string)));
        let session = self.session.lock().unwrap().take();
        session
            .map(|session| session as Arc<dyn ProtocolSession>)
            .ok_or_else(|| SessionError::Accept("client went away".into()))
    }
}
