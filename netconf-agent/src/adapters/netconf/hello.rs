use super::xml::{parse_document, render, XmlError};
use crate::domain::rpc::XmlElement;
use crate::domain::session::{Capability, CapabilitySet, SessionId, BASE_1_1};

pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HelloError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("expected <hello>, got <{0}>")]
    NotHello(String),
    #[error("client hello must not carry a session-id")]
    UnexpectedSessionId,
    #[error("client hello advertises no base capability")]
    NoBaseCapability,
    #[error("invalid capability: {0}")]
    InvalidCapability(String),
}

pub fn render_server_hello(capabilities: &CapabilitySet, session_id: SessionId) -> String {
    let list = capabilities.iter().fold(
        XmlElement::new("capabilities").with_namespace(NETCONF_BASE_NS),
        |list, capability| {
            list.with_child(
                XmlElement::new("capability")
                    .with_namespace(NETCONF_BASE_NS)
                    .with_text(capability.as_str()),
            )
        },
    );
    let hello = XmlElement::new("hello")
        .with_namespace(NETCONF_BASE_NS)
        .with_child(list)
        .with_child(
            XmlElement::new("session-id")
                .with_namespace(NETCONF_BASE_NS)
                .with_text(session_id.to_string()),
        );
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}", render(&hello))
}

/// Extracts the capabilities a client announced in its `<hello>`.
pub fn parse_client_hello(message: &[u8]) -> Result<CapabilitySet, HelloError> {
    let hello = parse_document(message)?;
    if hello.name != "hello" {
        return Err(HelloError::NotHello(hello.name));
    }
    if hello.child("session-id").is_some() {
        return Err(HelloError::UnexpectedSessionId);
    }
    let mut capabilities = CapabilitySet::new();
    for element in hello
        .child("capabilities")
        .map(|list| list.children.as_slice())
        .unwrap_or_default()
        .iter()
        .filter(|element| element.name == "capability")
    {
        let capability =
            Capability::new(element.text()).map_err(HelloError::InvalidCapability)?;
        capabilities.insert(capability);
    }
    if !capabilities.has_base() {
        return Err(HelloError::NoBaseCapability);
    }
    Ok(capabilities)
}

/// Chunked framing only when both peers speak base:1.1.
pub fn both_support_chunked(server: &CapabilitySet, client: &CapabilitySet) -> bool {
    server.contains(BASE_1_1) && client.contains(BASE_1_1)
}
