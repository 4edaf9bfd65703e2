use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::Transport => "transport",
            ErrorType::Rpc => "rpc",
            ErrorType::Protocol => "protocol",
            ErrorType::Application => "application",
        }
    }
}

/// `error-tag` values from RFC 6241 appendix A.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    MalformedMessage,
}

impl ErrorTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::MalformedMessage => "malformed-message",
        }
    }

    fn default_type(self) -> ErrorType {
        match self {
            ErrorTag::MalformedMessage => ErrorType::Rpc,
            ErrorTag::LockDenied | ErrorTag::UnknownNamespace => ErrorType::Protocol,
            _ => ErrorType::Application,
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            ErrorTag::InUse => "The request requires a resource that already is in use.",
            ErrorTag::InvalidValue => "The request specifies an unacceptable value for one or more parameters.",
            ErrorTag::TooBig => "The request or response (that would be generated) is too large for the implementation to handle.",
            ErrorTag::MissingAttribute => "An expected attribute is missing.",
            ErrorTag::BadAttribute => "An attribute value is not correct.",
            ErrorTag::UnknownAttribute => "An unexpected attribute is present.",
            ErrorTag::MissingElement => "An expected element is missing.",
            ErrorTag::BadElement => "An element value is not correct.",
            ErrorTag::UnknownElement => "An unexpected element is present.",
            ErrorTag::UnknownNamespace => "An unexpected namespace is present.",
            ErrorTag::AccessDenied => "Access to the requested protocol operation or data model is denied because authorization failed.",
            ErrorTag::LockDenied => "Access to the requested lock is denied because the lock is currently held by another entity.",
            ErrorTag::ResourceDenied => "Request could not be completed because of insufficient resources.",
            ErrorTag::RollbackFailed => "Request to roll back some configuration change was not completed for some reason.",
            ErrorTag::DataExists => "Request could not be completed because the relevant data model content already exists.",
            ErrorTag::DataMissing => "Request could not be completed because the relevant data model content does not exist.",
            ErrorTag::OperationNotSupported => "Request could not be completed because the requested operation is not supported by this implementation.",
            ErrorTag::OperationFailed => "Request could not be completed because the requested operation failed for some reason not covered by any other error condition.",
            ErrorTag::MalformedMessage => "A message could not be handled because it failed to be parsed correctly.",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    #[default]
    Error,
    Warning,
}

impl ErrorSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorInfo {
    BadElement(String),
    BadAttribute(String),
    BadNamespace(String),
    SessionId(u32),
}

/// One `<rpc-error>` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub tag: ErrorTag,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    #[serde(default)]
    pub severity: ErrorSeverity,
    #[serde(default)]
    pub app_tag: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub info: Vec<ErrorInfo>,
}

impl RpcError {
    pub fn new(tag: ErrorTag) -> Self {
        Self {
            tag,
            error_type: tag.default_type(),
            severity: ErrorSeverity::Error,
            app_tag: None,
            path: None,
            message: Some(tag.default_message().to_string()),
            info: Vec::new(),
        }
    }

    pub fn with_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = error_type;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_bad_element(mut self, element: impl Into<String>) -> Self {
        self.info.push(ErrorInfo::BadElement(element.into()));
        self
    }

    pub fn with_session_id(mut self, session_id: u32) -> Self {
        self.info.push(ErrorInfo::SessionId(session_id));
        self
    }

    pub fn bad_element(&self) -> Option<&str> {
        self.info.iter().find_map(|info| match info {
            ErrorInfo::BadElement(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tag, self.error_type.as_str())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Outcome of one RPC, sent back as `<rpc-reply>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Ok,
    /// Pre-encoded `<data>` content relayed from the management server.
    Data(String),
    Error(Vec<RpcError>),
}

impl Reply {
    pub fn error(error: RpcError) -> Self {
        Reply::Error(vec![error])
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Reply::Error(_))
    }

    pub fn errors(&self) -> &[RpcError] {
        match self {
            Reply::Error(errors) => errors,
            _ => &[],
        }
    }
}

impl From<RpcError> for Reply {
    fn from(error: RpcError) -> Self {
        Reply::error(error)
    }
}
