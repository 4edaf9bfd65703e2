use super::element::{XmlAttribute, XmlElement};
use std::fmt;

/// Operation kinds the agent handles itself; everything else goes to the
/// management server untouched.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RpcOperation {
    CloseSession,
    KillSession,
    CreateSubscription,
    Other(String),
}

impl RpcOperation {
    pub fn classify(content: &XmlElement) -> Self {
        match content.name.as_str() {
            "close-session" => RpcOperation::CloseSession,
            "kill-session" => RpcOperation::KillSession,
            "create-subscription" => RpcOperation::CreateSubscription,
            other => RpcOperation::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RpcOperation::CloseSession => "close-session",
            RpcOperation::KillSession => "kill-session",
            RpcOperation::CreateSubscription => "create-subscription",
            RpcOperation::Other(name) => name,
        }
    }
}

impl fmt::Display for RpcOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded client `<rpc>`.
///
/// `Clone` is the independent copy handed to notification delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcUnit {
    attributes: Vec<XmlAttribute>,
    operation: RpcOperation,
    content: Option<XmlElement>,
}

impl RpcUnit {
    /// Builds a unit whose kind is derived from the operation element.
    pub fn new(attributes: Vec<XmlAttribute>, content: XmlElement) -> Self {
        let operation = RpcOperation::classify(&content);
        Self {
            attributes,
            operation,
            content: Some(content),
        }
    }

    /// Builds a unit with an explicit kind, as a decoder may report the
    /// kind separately from the body it managed to extract.
    pub fn with_operation(
        operation: RpcOperation,
        attributes: Vec<XmlAttribute>,
        content: Option<XmlElement>,
    ) -> Self {
        Self {
            attributes,
            operation,
            content,
        }
    }

    pub fn operation(&self) -> &RpcOperation {
        &self.operation
    }

    pub fn content(&self) -> Option<&XmlElement> {
        self.content.as_ref()
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    pub fn message_id(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == "message-id")
            .map(|attr| attr.value.as_str())
    }
}
