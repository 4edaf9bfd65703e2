use super::hello::NETCONF_BASE_NS;
use super::xml::render_into;
use crate::domain::rpc::{ErrorInfo, Reply, RpcError, XmlAttribute, XmlElement};
use crate::ports::EventRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use xml::escape::{escape_str_attribute, escape_str_pcdata};

pub const NOTIFICATION_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";
const NOTIFICATION_EVENTS_NS: &str = "urn:ietf:params:xml:ns:netmod:notification";

/// Renders `<rpc-reply>` echoing every attribute of the request `<rpc>`.
pub fn render_reply(rpc_attributes: &[XmlAttribute], reply: &Reply) -> String {
    let mut out = String::new();
    let _ = write!(out, "<rpc-reply xmlns=\"{NETCONF_BASE_NS}\"");
    for attribute in rpc_attributes {
        let _ = write!(
            out,
            " {}=\"{}\"",
            attribute.name,
            escape_str_attribute(&attribute.value)
        );
    }
    out.push('>');
    match reply {
        Reply::Ok => out.push_str("<ok/>"),
        Reply::Data(content) => {
            let _ = write!(out, "<data>{content}</data>");
        }
        Reply::Error(errors) => {
            for error in errors {
                render_error(&mut out, error);
            }
        }
    }
    out.push_str("</rpc-reply>");
    out
}

fn render_error(out: &mut String, error: &RpcError) {
    out.push_str("<rpc-error>");
    text_element(out, "error-type", error.error_type.as_str());
    text_element(out, "error-tag", error.tag.as_str());
    text_element(out, "error-severity", error.severity.as_str());
    if let Some(app_tag) = &error.app_tag {
        text_element(out, "error-app-tag", app_tag);
    }
    if let Some(path) = &error.path {
        text_element(out, "error-path", path);
    }
    if let Some(message) = &error.message {
        let _ = write!(
            out,
            "<error-message xml:lang=\"en\">{}</error-message>",
            escape_str_pcdata(message)
        );
    }
    if !error.info.is_empty() {
        out.push_str("<error-info>");
        for info in &error.info {
            match info {
                ErrorInfo::BadElement(name) => text_element(out, "bad-element", name),
                ErrorInfo::BadAttribute(name) => text_element(out, "bad-attribute", name),
                ErrorInfo::BadNamespace(name) => text_element(out, "bad-namespace", name),
                ErrorInfo::SessionId(id) => text_element(out, "session-id", &id.to_string()),
            }
        }
        out.push_str("</error-info>");
    }
    out.push_str("</rpc-error>");
}

fn text_element(out: &mut String, name: &str, text: &str) {
    let _ = write!(out, "<{name}>{}</{name}>", escape_str_pcdata(text));
}

fn event_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Wraps pre-encoded event content in a `<notification>`.
pub fn render_notification(event: &EventRecord) -> String {
    format!(
        "<notification xmlns=\"{NOTIFICATION_NS}\"><eventTime>{}</eventTime>{}</notification>",
        event_time(&event.event_time),
        event.content
    )
}

/// RFC 5277 notice that a subscription with a stopTime has ended.
pub fn render_notification_complete(at: DateTime<Utc>) -> String {
    let mut out = format!(
        "<notification xmlns=\"{NOTIFICATION_NS}\"><eventTime>{}</eventTime>",
        event_time(&at)
    );
    render_into(
        &mut out,
        &XmlElement::new("notificationComplete").with_namespace(NOTIFICATION_EVENTS_NS),
        Some(NOTIFICATION_NS),
    );
    out.push_str("</notification>");
    out
}
