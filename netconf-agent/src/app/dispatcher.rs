use crate::app::notification::NotificationTask;
use crate::domain::rpc::{ErrorTag, ErrorType, Reply, RpcError, RpcOperation, RpcUnit};
use crate::domain::session::{SessionStatus, SubscriptionSlot, NOTIFICATION_1_0};
use crate::ports::{BackendConnection, ProtocolSession};
use std::sync::Arc;
use tracing::{debug, warn};

const SUBSCRIPTION_ACTIVE: &str =
    "Another notification subscription is currently active on this session.";
const SPAWN_FAILED: &str = "Creating task for sending notifications failed.";

/// Outcome of one dispatched RPC: the single reply to send and, for an
/// accepted subscription, the delivery task waiting to be released.
#[derive(Debug)]
pub struct Dispatch {
    pub reply: Reply,
    pub notifications: Option<NotificationTask>,
}

impl From<Reply> for Dispatch {
    fn from(reply: Reply) -> Self {
        Self {
            reply,
            notifications: None,
        }
    }
}

pub struct RpcDispatcher<'a> {
    session: &'a Arc<dyn ProtocolSession>,
    backend: &'a mut dyn BackendConnection,
    subscription: &'a SubscriptionSlot,
}

impl<'a> RpcDispatcher<'a> {
    pub fn new(
        session: &'a Arc<dyn ProtocolSession>,
        backend: &'a mut dyn BackendConnection,
        subscription: &'a SubscriptionSlot,
    ) -> Self {
        Self {
            session,
            backend,
            subscription,
        }
    }

    pub async fn dispatch(&mut self, rpc: &RpcUnit) -> Dispatch {
        debug!(
            session_id = %self.session.id(),
            operation = %rpc.operation(),
            message_id = rpc.message_id().unwrap_or(""),
            "dispatching rpc"
        );
        match rpc.operation() {
            RpcOperation::CloseSession => self.close_session().await.into(),
            RpcOperation::KillSession => self.kill_session(rpc).await.into(),
            RpcOperation::CreateSubscription => self.create_subscription(rpc).await,
            RpcOperation::Other(_) => self.forward(rpc).await.into(),
        }
    }

    async fn close_session(&mut self) -> Reply {
        let session_id = self.session.id();
        let reply = match self.backend.close(session_id).await {
            Ok(()) => Reply::Ok,
            Err(err) => {
                warn!(%session_id, error = %err, "backend failed to close session");
                Reply::error(
                    RpcError::new(ErrorTag::OperationFailed)
                        .with_message(format!("Closing the session failed: {err}.")),
                )
            }
        };
        self.session.set_status(SessionStatus::Terminating);
        reply
    }

    async fn kill_session(&mut self, rpc: &RpcUnit) -> Reply {
        let Some(body) = rpc
            .content()
            .filter(|content| content.name == "kill-session")
        else {
            return Reply::error(
                RpcError::new(ErrorTag::OperationFailed)
                    .with_message("Corrupted kill-session request."),
            );
        };
        let Some(target) = body
            .first_child()
            .filter(|child| child.name == "session-id")
        else {
            return Reply::error(
                RpcError::new(ErrorTag::MissingElement)
                    .with_type(ErrorType::Protocol)
                    .with_bad_element("session-id")
                    .with_message("Missing session-id element."),
            );
        };
        self.backend
            .kill_session(self.session.id(), target.text())
            .await
    }

    async fn create_subscription(&mut self, rpc: &RpcUnit) -> Dispatch {
        if !self.session.capability_enabled(NOTIFICATION_1_0) {
            return Reply::error(
                RpcError::new(ErrorTag::OperationNotSupported)
                    .with_type(ErrorType::Protocol)
                    .with_message("Notifications are not supported on this session."),
            )
            .into();
        }
        let guard = self
            .session
            .notifications_allowed()
            .then(|| self.subscription.try_claim())
            .flatten();
        let Some(guard) = guard else {
            return Reply::error(
                RpcError::new(ErrorTag::OperationFailed)
                    .with_type(ErrorType::Protocol)
                    .with_message(SUBSCRIPTION_ACTIVE),
            )
            .into();
        };

        let checked = self.session.check_subscription(rpc).await;
        if !checked.is_ok() {
            return checked.into();
        }

        match NotificationTask::spawn(Arc::clone(self.session), rpc.clone(), guard) {
            Ok(task) => Dispatch {
                reply: checked,
                notifications: Some(task),
            },
            Err(err) => {
                warn!(session_id = %self.session.id(), error = %err, "notification task not started");
                Reply::error(RpcError::new(ErrorTag::OperationFailed).with_message(SPAWN_FAILED))
                    .into()
            }
        }
    }

    async fn forward(&mut self, rpc: &RpcUnit) -> Reply {
        self.backend.forward_operation(self.session.id(), rpc).await
    }
}
