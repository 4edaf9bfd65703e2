use crate::domain::rpc::RpcUnit;
use crate::domain::session::{SessionId, SubscriptionGuard};
use crate::ports::ProtocolSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("no runtime available for notification delivery: {0}")]
    NoRuntime(String),
}

/// Handle on the background task streaming notifications for one
/// `create-subscription`.
///
/// The task parks until [`NotificationTask::release`] so the subscription's
/// `<ok/>` reply reaches the client before the first notification.
#[derive(Debug)]
pub struct NotificationTask {
    session_id: SessionId,
    release: Option<oneshot::Sender<()>>,
    handle: JoinHandle<u64>,
}

impl NotificationTask {
    pub fn spawn(
        session: Arc<dyn ProtocolSession>,
        subscribe: RpcUnit,
        guard: SubscriptionGuard,
    ) -> Result<Self, SpawnError> {
        let runtime = Handle::try_current().map_err(|err| SpawnError::NoRuntime(err.to_string()))?;
        let session_id = session.id();
        let (release, released) = oneshot::channel();
        let handle = runtime.spawn(async move {
            let _guard = guard;
            if released.await.is_err() {
                debug!(%session_id, "subscription withdrawn before delivery started");
                return 0;
            }
            let sent = session.dispatch_notifications(&subscribe).await;
            info!(%session_id, sent, "notification delivery finished");
            sent
        });
        Ok(Self {
            session_id,
            release: Some(release),
            handle,
        })
    }

    /// Lets the task start streaming. Dropping an unreleased task withdraws
    /// the subscription instead.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
    }

    /// Waits up to `grace` for the task to wind down after teardown was
    /// signalled, aborting it past the deadline. Returns the number of
    /// notifications sent when the task ended on its own.
    pub async fn finish(mut self, grace: Duration) -> Option<u64> {
        self.release.take();
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(sent)) => Some(sent),
            Ok(Err(err)) => {
                warn!(session_id = %self.session_id, error = %err, "notification task failed");
                None
            }
            Err(_) => {
                warn!(
                    session_id = %self.session_id,
                    grace_ms = grace.as_millis() as u64,
                    "notification task did not stop in time, aborting"
                );
                self.handle.abort();
                None
            }
        }
    }
}
