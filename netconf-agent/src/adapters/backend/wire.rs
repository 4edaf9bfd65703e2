//! JSON-lines messages exchanged with the management server.

use crate::domain::rpc::RpcError;
use crate::domain::session::SessionId;
use crate::ports::SessionInfo;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "kebab-case")]
pub enum BackendRequest {
    GetCapabilities,
    SessionInfo(SessionInfo),
    Operation {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        /// The operation element as XML text.
        operation: String,
    },
    CloseSession {
        session_id: SessionId,
    },
    KillSession {
        session_id: SessionId,
        target: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "kebab-case")]
pub enum BackendResponse {
    Capabilities { capabilities: Vec<String> },
    Ok,
    Data { content: String },
    Error { errors: Vec<RpcError> },
}

impl BackendResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendResponse::Capabilities { .. } => "capabilities",
            BackendResponse::Ok => "ok",
            BackendResponse::Data { .. } => "data",
            BackendResponse::Error { .. } => "error",
        }
    }

    /// First error message, for logging a rejected control request.
    pub fn rejection(&self) -> Option<String> {
        match self {
            BackendResponse::Error { errors } => Some(
                errors
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unspecified error".to_string()),
            ),
            _ => None,
        }
    }
}
