//! Backend client speaking JSON lines over the management server's Unix
//! socket, one outstanding request at a time.

use super::wire::{BackendRequest, BackendResponse};
use crate::adapters::netconf::xml::render;
use crate::domain::rpc::{ErrorTag, Reply, RpcError, RpcUnit};
use crate::domain::session::SessionId;
use crate::ports::{BackendConnection, BackendConnector, BackendError, SessionInfo};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::{debug, warn};

pub const DEFAULT_BACKEND_SOCKET: &str = "/var/run/netconf-agent/backend.sock";

#[derive(Debug, Clone)]
pub struct UnixBackendConnector {
    path: PathBuf,
}

impl UnixBackendConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BackendConnector for UnixBackendConnector {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>, BackendError> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|err| BackendError::Unreachable(format!("{}: {err}", self.path.display())))?;
        debug!(path = %self.path.display(), "connected to management server");
        Ok(Box::new(UnixBackendConnection::new(stream)))
    }
}

pub struct UnixBackendConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl UnixBackendConnection {
    pub fn new(stream: UnixStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    async fn call(&mut self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        let mut payload =
            serde_json::to_vec(request).map_err(|err| BackendError::Protocol(err.to_string()))?;
        payload.push(b'\n');
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;

        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(BackendError::Unreachable(
                "management server closed the connection".into(),
            ));
        }
        serde_json::from_str(&line).map_err(|err| BackendError::Protocol(err.to_string()))
    }

    async fn expect_ok(&mut self, request: &BackendRequest) -> Result<(), BackendError> {
        match self.call(request).await? {
            BackendResponse::Ok => Ok(()),
            response @ BackendResponse::Error { .. } => Err(BackendError::Rejected(
                response.rejection().unwrap_or_default(),
            )),
            other => Err(BackendError::Protocol(format!(
                "unexpected {} response",
                other.kind()
            ))),
        }
    }

    async fn relay(&mut self, request: &BackendRequest) -> Reply {
        match self.call(request).await {
            Ok(BackendResponse::Ok) => Reply::Ok,
            Ok(BackendResponse::Data { content }) => Reply::Data(content),
            Ok(BackendResponse::Error { errors }) if !errors.is_empty() => Reply::Error(errors),
            Ok(other) => {
                warn!(response = other.kind(), "unusable backend reply");
                operation_failed("Management server returned an unusable reply.")
            }
            Err(err) => {
                warn!(error = %err, "backend request failed");
                operation_failed(&format!("Management server request failed: {err}."))
            }
        }
    }
}

fn operation_failed(message: &str) -> Reply {
    Reply::error(RpcError::new(ErrorTag::OperationFailed).with_message(message))
}

#[async_trait]
impl BackendConnection for UnixBackendConnection {
    async fn capabilities(&mut self) -> Result<Vec<String>, BackendError> {
        match self.call(&BackendRequest::GetCapabilities).await? {
            BackendResponse::Capabilities { capabilities } => Ok(capabilities),
            response @ BackendResponse::Error { .. } => Err(BackendError::Rejected(
                response.rejection().unwrap_or_default(),
            )),
            other => Err(BackendError::Protocol(format!(
                "expected capabilities, got {}",
                other.kind()
            ))),
        }
    }

    async fn exchange_session_info(&mut self, info: &SessionInfo) -> Result<(), BackendError> {
        self.expect_ok(&BackendRequest::SessionInfo(info.clone()))
            .await
    }

    async fn forward_operation(&mut self, session: SessionId, rpc: &RpcUnit) -> Reply {
        let Some(content) = rpc.content() else {
            return operation_failed("Operation has no body.");
        };
        let request = BackendRequest::Operation {
            session_id: session,
            message_id: rpc.message_id().map(str::to_string),
            operation: render(content),
        };
        self.relay(&request).await
    }

    async fn close(&mut self, session: SessionId) -> Result<(), BackendError> {
        self.expect_ok(&BackendRequest::CloseSession {
            session_id: session,
        })
        .await
    }

    async fn kill_session(&mut self, session: SessionId, target: &str) -> Reply {
        let request = BackendRequest::KillSession {
            session_id: session,
            target: target.to_string(),
        };
        self.relay(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rpc::{XmlAttribute, XmlElement};
    use tokio::net::UnixListener;
    use tokio::task::JoinHandle;

    /// Answers each request with `respond` and returns what it received.
    fn serve(
        listener: UnixListener,
        respond: fn(&BackendRequest) -> Option<BackendResponse>,
    ) -> JoinHandle<Vec<BackendRequest>> {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut seen = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                let request: BackendRequest = serde_json::from_str(&line).unwrap();
                let response = respond(&request);
                seen.push(request);
                let Some(response) = response else {
                    break;
                };
                let mut out = serde_json::to_vec(&response).unwrap();
                out.push(b'\n');
                write.write_all(&out).await.unwrap();
            }
            seen
        })
    }

    fn socket() -> (tempfile::TempDir, PathBuf, UnixListener) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.sock");
        let listener = UnixListener::bind(&path).unwrap();
        (dir, path, listener)
    }

    fn sid() -> SessionId {
        SessionId::new(41).unwrap()
    }

    fn get_rpc() -> RpcUnit {
        RpcUnit::new(
            vec![XmlAttribute::new("message-id", "5")],
            XmlElement::new("get").with_child(XmlElement::new("filter")),
        )
    }

    #[tokio::test]
    async fn unreachable_socket_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let connector = UnixBackendConnector::new(dir.path().join("absent.sock"));
        assert!(matches!(
            connector.connect().await,
            Err(BackendError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn round_trips_control_requests() {
        let (_dir, path, listener) = socket();
        let server = serve(listener, |request| {
            Some(match request {
                BackendRequest::GetCapabilities => BackendResponse::Capabilities {
                    capabilities: vec!["urn:ietf:params:netconf:base:1.0".into()],
                },
                BackendRequest::Operation { .. } => BackendResponse::Data {
                    content: "<top/>".into(),
                },
                _ => BackendResponse::Ok,
            })
        });

        let mut backend = UnixBackendConnector::new(&path).connect().await.unwrap();
        assert_eq!(backend.capabilities().await.unwrap().len(), 1);
        backend
            .exchange_session_info(&SessionInfo {
                session_id: sid(),
                username: None,
                capabilities: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(
            backend.forward_operation(sid(), &get_rpc()).await,
            Reply::Data("<top/>".into())
        );
        assert_eq!(backend.kill_session(sid(), "12").await, Reply::Ok);
        backend.close(sid()).await.unwrap();
        drop(backend);

        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(
            seen[2],
            BackendRequest::Operation {
                session_id: sid(),
                message_id: Some("5".into()),
                operation: "<get><filter/></get>".into(),
            }
        );
        assert!(matches!(
            &seen[3],
            BackendRequest::KillSession { target, .. } if target == "12"
        ));
    }

    #[tokio::test]
    async fn backend_errors_are_relayed_or_rejected() {
        let (_dir, path, listener) = socket();
        let _server = serve(listener, |_| {
            Some(BackendResponse::Error {
                errors: vec![RpcError::new(ErrorTag::AccessDenied).with_message("nope")],
            })
        });

        let mut backend = UnixBackendConnector::new(&path).connect().await.unwrap();
        let reply = backend.forward_operation(sid(), &get_rpc()).await;
        assert_eq!(reply.errors()[0].tag, ErrorTag::AccessDenied);
        assert!(matches!(
            backend.close(sid()).await,
            Err(BackendError::Rejected(message)) if message.contains("nope")
        ));
        assert!(matches!(
            backend.capabilities().await,
            Err(BackendError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn lost_connection_becomes_operation_failed() {
        let (_dir, path, listener) = socket();
        let server = serve(listener, |_| None);

        let mut backend = UnixBackendConnector::new(&path).connect().await.unwrap();
        let reply = backend.forward_operation(sid(), &get_rpc()).await;
        assert_eq!(reply.errors()[0].tag, ErrorTag::OperationFailed);
        assert_eq!(server.await.unwrap().len(), 1);
        assert!(backend.close(sid()).await.is_err());
    }
}
