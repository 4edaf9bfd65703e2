//! A NETCONF session over any async byte transport.
//!
//! Reads happen only from the event loop. Writes come from the event loop
//! (replies) and from the notification task; each framed message is written
//! whole under the writer lock.

use super::framing::{encode_message, read_message, Framing, FramingError};
use super::message::{render_notification, render_notification_complete, render_reply};
use super::xml::parse_document;
use crate::domain::rpc::{
    ErrorInfo, ErrorTag, ErrorType, Reply, RpcError, RpcUnit, SubscriptionRequest, XmlAttribute,
};
use crate::domain::session::{CapabilitySet, SessionId, SessionStatus};
use crate::ports::{EventSource, ProtocolSession, Readiness, Received, SessionError};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const WORKING: u8 = 0;
const TERMINATING: u8 = 1;
const TERMINATED: u8 = 2;

fn encode_status(status: SessionStatus) -> u8 {
    match status {
        SessionStatus::Working => WORKING,
        SessionStatus::Terminating => TERMINATING,
        SessionStatus::Terminated => TERMINATED,
    }
}

fn decode_status(raw: u8) -> SessionStatus {
    match raw {
        WORKING => SessionStatus::Working,
        TERMINATING => SessionStatus::Terminating,
        _ => SessionStatus::Terminated,
    }
}

pub struct SessionParams {
    pub id: SessionId,
    pub username: Option<String>,
    pub capabilities: CapabilitySet,
    pub framing: Framing,
    pub max_message_bytes: usize,
}

pub struct FramedSession<R, W> {
    id: SessionId,
    username: Option<String>,
    capabilities: CapabilitySet,
    framing: Framing,
    max_message_bytes: usize,
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
    status: AtomicU8,
    teardown: CancellationToken,
    events: Arc<dyn EventSource>,
}

impl<R, W> FramedSession<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        params: SessionParams,
        reader: BufReader<R>,
        writer: W,
        events: Arc<dyn EventSource>,
    ) -> Self {
        Self {
            id: params.id,
            username: params.username,
            capabilities: params.capabilities,
            framing: params.framing,
            max_message_bytes: params.max_message_bytes,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            status: AtomicU8::new(WORKING),
            teardown: CancellationToken::new(),
            events,
        }
    }

    async fn write_message(&self, payload: &str) -> Result<(), SessionError> {
        let frame = encode_message(payload.as_bytes(), self.framing);
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|err| SessionError::Write(err.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|err| SessionError::Write(err.to_string()))
    }

    /// Answers a request the loop will never see.
    async fn reject(&self, attributes: &[XmlAttribute], error: RpcError) {
        let reply = render_reply(attributes, &Reply::error(error));
        if let Err(err) = self.write_message(&reply).await {
            warn!(session_id = %self.id, error = %err, "failed to send rejection");
        }
    }

    async fn classify(&self, message: &[u8]) -> Received {
        let document = match parse_document(message) {
            Ok(document) => document,
            Err(err) => {
                debug!(session_id = %self.id, error = %err, "undecodable message");
                return Received::Unknown;
            }
        };
        if document.name != "rpc" {
            debug!(session_id = %self.id, root = %document.name, "message is not an rpc");
            return Received::Unknown;
        }
        let attributes = document.attributes;
        let has_message_id = attributes.iter().any(|attr| attr.name == "message-id");
        let Some(mut content) = document.children.into_iter().next() else {
            if has_message_id {
                self.reject(
                    &attributes,
                    RpcError::new(ErrorTag::MalformedMessage)
                        .with_message("The rpc element carries no operation."),
                )
                .await;
            }
            return Received::Unknown;
        };
        if !has_message_id {
            let mut error = RpcError::new(ErrorTag::MissingAttribute)
                .with_type(ErrorType::Rpc)
                .with_message("Missing message-id attribute in the rpc element.");
            error.info.push(ErrorInfo::BadAttribute("message-id".into()));
            error.info.push(ErrorInfo::BadElement("rpc".into()));
            self.reject(&attributes, error).await;
            return Received::Unknown;
        }
        content.inherit_declarations(&attributes);
        Received::Rpc(RpcUnit::new(attributes, content))
    }
}

#[async_trait]
impl<R, W> ProtocolSession for FramedSession<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn id(&self) -> SessionId {
        self.id
    }

    fn username(&self) -> Option<String> {
        self.username.clone()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    fn status(&self) -> SessionStatus {
        decode_status(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.store(encode_status(status), Ordering::Release);
    }

    fn notifications_allowed(&self) -> bool {
        self.capabilities.supports_notifications() && self.status().is_working()
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<Readiness, SessionError> {
        if self.status() == SessionStatus::Terminated {
            return Err(SessionError::Terminated);
        }
        let mut reader = self.reader.lock().await;
        let readiness = match tokio::time::timeout(timeout, reader.fill_buf()).await {
            Err(_) => Readiness::Timeout,
            Ok(Ok(buffered)) if buffered.is_empty() => Readiness::HangUp,
            Ok(Ok(_)) => Readiness::DataReady,
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::Interrupted => {
                Readiness::Interrupted
            }
            Ok(Err(err)) => Readiness::IoError(err.to_string()),
        };
        Ok(readiness)
    }

    async fn receive_rpc(&self) -> Received {
        let message = {
            let mut reader = self.reader.lock().await;
            read_message(&mut *reader, self.framing, self.max_message_bytes).await
        };
        match message {
            Ok(message) => self.classify(&message).await,
            Err(FramingError::Closed) => Received::HangUp,
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "framing broken, terminating session");
                self.set_status(SessionStatus::Terminated);
                Received::Unknown
            }
        }
    }

    async fn send_reply(&self, rpc: &RpcUnit, reply: &Reply) -> Result<(), SessionError> {
        if self.status() == SessionStatus::Terminated {
            return Err(SessionError::Terminated);
        }
        self.write_message(&render_reply(rpc.attributes(), reply)).await
    }

    async fn check_subscription(&self, rpc: &RpcUnit) -> Reply {
        match SubscriptionRequest::from_rpc(rpc, &self.events.streams(), Utc::now()) {
            Ok(_) => Reply::Ok,
            Err(error) => Reply::error(error),
        }
    }

    async fn dispatch_notifications(&self, subscribe: &RpcUnit) -> u64 {
        let request =
            match SubscriptionRequest::from_rpc(subscribe, &self.events.streams(), Utc::now()) {
                Ok(request) => request,
                Err(err) => {
                    warn!(session_id = %self.id, error = %err, "subscription no longer valid");
                    return 0;
                }
            };
        let mut events = match self.events.open(&request).await {
            Ok(events) => events,
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "cannot open event stream");
                return 0;
            }
        };
        info!(session_id = %self.id, stream = %request.stream, "notification delivery started");

        let stop_in = request
            .stop_time
            .and_then(|stop| (stop - Utc::now()).to_std().ok());
        let stop_timer = async move {
            match stop_in {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(stop_timer);

        let mut sent = 0;
        let mut completed = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.teardown.cancelled() => break,
                next = events.next() => next,
                _ = &mut stop_timer => {
                    completed = true;
                    break;
                }
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    warn!(session_id = %self.id, error = %err, "event stream failed");
                    break;
                }
                None => {
                    completed = request.stop_time.is_some();
                    break;
                }
            };
            if request.stop_time.is_some_and(|stop| event.event_time > stop) {
                completed = true;
                break;
            }
            if request
                .start_time
                .is_some_and(|start| event.event_time < start)
            {
                continue;
            }
            if let Err(err) = self.write_message(&render_notification(&event)).await {
                debug!(session_id = %self.id, error = %err, "notification write failed");
                return sent;
            }
            sent += 1;
        }

        if completed && !self.teardown.is_cancelled() {
            let done = render_notification_complete(Utc::now());
            if let Err(err) = self.write_message(&done).await {
                debug!(session_id = %self.id, error = %err, "notificationComplete not sent");
            }
        }
        sent
    }

    async fn close(&self) {
        self.set_status(SessionStatus::Terminated);
        self.teardown.cancel();
        // A notification write may still hold the writer; it ends on teardown.
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::IdleEventSource;
    use crate::adapters::netconf::xml::parse_document;
    use crate::domain::rpc::XmlElement;
    use crate::domain::session::{BASE_1_0, NOTIFICATION_1_0};
    use crate::ports::{EventRecord, EventSourceError, EventStream};
    use chrono::{DateTime, Duration as ChronoDuration};
    use tokio::io::{duplex, AsyncReadExt, DuplexStream, ReadHalf, WriteHalf};

    type TestSession = FramedSession<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    struct ScriptedEvents(Vec<EventRecord>);

    #[async_trait]
    impl EventSource for ScriptedEvents {
        fn streams(&self) -> Vec<String> {
            vec!["NETCONF".into()]
        }

        async fn open(
            &self,
            _request: &SubscriptionRequest,
        ) -> Result<EventStream, EventSourceError> {
            let events: Vec<_> = self.0.iter().cloned().map(Ok).collect();
            Ok(futures::stream::iter(events).boxed())
        }
    }

    fn session_with(
        caps: &[&str],
        framing: Framing,
        events: Arc<dyn EventSource>,
    ) -> (TestSession, DuplexStream) {
        let (agent, client) = duplex(64 * 1024);
        let (read, write) = tokio::io::split(agent);
        let session = FramedSession::new(
            SessionParams {
                id: SessionId::new(9).unwrap(),
                username: Some("erin".into()),
                capabilities: CapabilitySet::from_uris(caps.iter().copied()).unwrap(),
                framing,
                max_message_bytes: 64 * 1024,
            },
            BufReader::new(read),
            write,
            events,
        );
        (session, client)
    }

    fn session(framing: Framing) -> (TestSession, DuplexStream) {
        session_with(&[BASE_1_0], framing, Arc::new(IdleEventSource::new()))
    }

    async fn read_reply(client: &mut DuplexStream, framing: Framing) -> XmlElement {
        let mut reader = BufReader::new(client);
        let bytes = read_message(&mut reader, framing, 64 * 1024).await.unwrap();
        parse_document(&bytes).unwrap()
    }

    #[tokio::test]
    async fn readiness_reports_timeout_data_and_hangup() {
        let (session, mut client) = session(Framing::EndOfMessage);
        assert_eq!(
            session.wait_ready(Duration::from_millis(10)).await.unwrap(),
            Readiness::Timeout
        );
        client.write_all(b"<rpc").await.unwrap();
        assert_eq!(
            session.wait_ready(Duration::from_millis(10)).await.unwrap(),
            Readiness::DataReady
        );
        drop(client);
        let (session, client) = self::session(Framing::EndOfMessage);
        drop(client);
        assert_eq!(
            session.wait_ready(Duration::from_millis(10)).await.unwrap(),
            Readiness::HangUp
        );
    }

    #[tokio::test]
    async fn receives_rpc_and_replies_with_same_message_id() {
        let (session, mut client) = session(Framing::EndOfMessage);
        client
            .write_all(b"<rpc message-id=\"5\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><get/></rpc>]]>]]>")
            .await
            .unwrap();
        let Received::Rpc(rpc) = session.receive_rpc().await else {
            panic!("expected rpc");
        };
        assert_eq!(rpc.operation().name(), "get");
        session.send_reply(&rpc, &Reply::Ok).await.unwrap();
        let reply = read_reply(&mut client, Framing::EndOfMessage).await;
        assert_eq!(reply.attribute("message-id"), Some("5"));
        assert!(reply.child("ok").is_some());
    }

    #[tokio::test]
    async fn chunked_session_round_trip() {
        let (session, mut client) = session(Framing::Chunked);
        let rpc = b"<rpc message-id=\"8\"><close-session/></rpc>";
        client
            .write_all(&encode_message(rpc, Framing::Chunked))
            .await
            .unwrap();
        let Received::Rpc(unit) = session.receive_rpc().await else {
            panic!("expected rpc");
        };
        session.send_reply(&unit, &Reply::Ok).await.unwrap();
        let reply = read_reply(&mut client, Framing::Chunked).await;
        assert_eq!(reply.attribute("message-id"), Some("8"));
    }

    #[tokio::test]
    async fn empty_rpc_is_rejected_internally() {
        let (session, mut client) = session(Framing::EndOfMessage);
        client
            .write_all(b"<rpc message-id=\"3\"/>]]>]]>")
            .await
            .unwrap();
        assert_eq!(session.receive_rpc().await, Received::Unknown);
        assert!(session.status().is_working());
        let reply = read_reply(&mut client, Framing::EndOfMessage).await;
        let tag = reply.child("rpc-error").unwrap().child("error-tag").unwrap();
        assert_eq!(tag.text(), "malformed-message");
    }

    #[tokio::test]
    async fn missing_message_id_gets_missing_attribute() {
        let (session, mut client) = session(Framing::EndOfMessage);
        client.write_all(b"<rpc><get/></rpc>]]>]]>").await.unwrap();
        assert_eq!(session.receive_rpc().await, Received::Unknown);
        let reply = read_reply(&mut client, Framing::EndOfMessage).await;
        let error = reply.child("rpc-error").unwrap();
        assert_eq!(error.child("error-tag").unwrap().text(), "missing-attribute");
        assert_eq!(
            error.child("error-info").unwrap().child("bad-attribute").unwrap().text(),
            "message-id"
        );
    }

    #[tokio::test]
    async fn garbage_is_unknown_but_session_survives() {
        let (session, mut client) = session(Framing::EndOfMessage);
        client.write_all(b"<hello>]]>]]>").await.unwrap();
        assert_eq!(session.receive_rpc().await, Received::Unknown);
        assert!(session.status().is_working());
    }

    #[tokio::test]
    async fn trailing_whitespace_then_close_is_a_hang_up() {
        let (session, mut client) = session(Framing::EndOfMessage);
        client
            .write_all(b"<rpc message-id=\"1\"><get/></rpc>]]>]]>\n")
            .await
            .unwrap();
        assert!(matches!(session.receive_rpc().await, Received::Rpc(_)));
        drop(client);
        assert_eq!(
            session.wait_ready(Duration::from_millis(10)).await.unwrap(),
            Readiness::DataReady
        );
        assert_eq!(session.receive_rpc().await, Received::HangUp);
    }

    #[tokio::test]
    async fn operation_carries_prefixes_declared_on_rpc() {
        let (session, mut client) = session(Framing::EndOfMessage);
        client
            .write_all(
                b"<rpc message-id=\"2\" xmlns:if=\"urn:if\"><get><filter type=\"xpath\" select=\"/if:interfaces\"/></get></rpc>]]>]]>",
            )
            .await
            .unwrap();
        let Received::Rpc(rpc) = session.receive_rpc().await else {
            panic!("expected rpc");
        };
        let rendered = crate::adapters::netconf::xml::render(rpc.content().unwrap());
        assert!(rendered.starts_with("<get xmlns:if=\"urn:if\">"), "{rendered}");
    }

    #[tokio::test]
    async fn broken_framing_terminates_session() {
        let (session, mut client) = session(Framing::Chunked);
        client.write_all(b"\n#x\n").await.unwrap();
        assert_eq!(session.receive_rpc().await, Received::Unknown);
        assert_eq!(session.status(), SessionStatus::Terminated);

        let (session, mut client) = self::session(Framing::EndOfMessage);
        client.write_all(b"<rpc message-id=\"1\">").await.unwrap();
        drop(client);
        assert_eq!(session.receive_rpc().await, Received::Unknown);
        assert_eq!(session.status(), SessionStatus::Terminated);
    }

    #[tokio::test]
    async fn subscription_check_validates_stream() {
        let (session, _client) = session(Framing::EndOfMessage);
        let good = RpcUnit::new(Vec::new(), XmlElement::new("create-subscription"));
        assert_eq!(session.check_subscription(&good).await, Reply::Ok);
        let bad = RpcUnit::new(
            Vec::new(),
            XmlElement::new("create-subscription")
                .with_child(XmlElement::new("stream").with_text("nope")),
        );
        let reply = session.check_subscription(&bad).await;
        assert_eq!(reply.errors()[0].tag, ErrorTag::InvalidValue);
    }

    #[tokio::test]
    async fn delivers_notifications_until_stop_time() {
        let start = Utc::now() - ChronoDuration::minutes(10);
        let stop = start + ChronoDuration::minutes(5);
        let at = |minutes| -> DateTime<Utc> { start + ChronoDuration::minutes(minutes) };
        let events = Arc::new(ScriptedEvents(vec![
            EventRecord {
                event_time: at(1),
                content: "<first xmlns=\"urn:ex\"/>".into(),
            },
            EventRecord {
                event_time: at(2),
                content: "<second xmlns=\"urn:ex\"/>".into(),
            },
            EventRecord {
                event_time: at(7),
                content: "<late xmlns=\"urn:ex\"/>".into(),
            },
        ]));
        let (session, mut client) =
            session_with(&[BASE_1_0, NOTIFICATION_1_0], Framing::EndOfMessage, events);
        let subscribe = RpcUnit::new(
            Vec::new(),
            XmlElement::new("create-subscription")
                .with_child(XmlElement::new("startTime").with_text(start.to_rfc3339()))
                .with_child(XmlElement::new("stopTime").with_text(stop.to_rfc3339())),
        );
        assert_eq!(session.dispatch_notifications(&subscribe).await, 2);
        drop(session);

        let mut wire = Vec::new();
        client.read_to_end(&mut wire).await.unwrap();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("<first"));
        assert!(text.contains("<second"));
        assert!(!text.contains("<late"));
        assert!(text.contains("notificationComplete"));
    }

    #[tokio::test]
    async fn teardown_stops_idle_delivery() {
        let (session, _client) = session_with(
            &[BASE_1_0, NOTIFICATION_1_0],
            Framing::EndOfMessage,
            Arc::new(IdleEventSource::new()),
        );
        let session = Arc::new(session);
        let subscribe = RpcUnit::new(Vec::new(), XmlElement::new("create-subscription"));
        let worker = {
            let session = session.clone();
            tokio::spawn(async move { session.dispatch_notifications(&subscribe).await })
        };
        tokio::task::yield_now().await;
        session.close().await;
        assert_eq!(worker.await.unwrap(), 0);
        assert!(!session.notifications_allowed());
    }
}
