use crate::domain::rpc::{XmlAttribute, XmlElement};
use std::fmt::Write as _;
use xml::escape::{escape_str_attribute, escape_str_pcdata};
use xml::namespace::{Namespace, NS_NO_PREFIX};
use xml::reader::{ParserConfig, XmlEvent};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum XmlError {
    #[error("malformed xml: {0}")]
    Syntax(String),
    #[error("document has no root element")]
    Empty,
}

/// Parses a whole message into an element tree. Comments and processing
/// instructions are dropped; CDATA becomes text.
pub fn parse_document(bytes: &[u8]) -> Result<XmlElement, XmlError> {
    let reader = ParserConfig::new()
        .cdata_to_characters(true)
        .ignore_comments(true)
        .create_reader(bytes);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut scopes: Vec<Namespace> = Vec::new();
    let mut root = None;
    for event in reader {
        match event.map_err(|err| XmlError::Syntax(err.to_string()))? {
            XmlEvent::StartElement {
                name,
                attributes,
                namespace: scope,
            } => {
                let mut element = XmlElement::new(name.local_name);
                element.namespace = name.namespace;
                element
                    .attributes
                    .extend(declared_prefixes(&scope, scopes.last()));
                for attribute in attributes {
                    let attr_name = match attribute.name.prefix {
                        Some(prefix) => format!("{prefix}:{}", attribute.name.local_name),
                        None => attribute.name.local_name,
                    };
                    element
                        .attributes
                        .push(XmlAttribute::new(attr_name, attribute.value));
                }
                stack.push(element);
                scopes.push(scope);
            }
            XmlEvent::EndElement { .. } => {
                let Some(element) = stack.pop() else {
                    return Err(XmlError::Syntax("unbalanced end tag".into()));
                };
                scopes.pop();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            XmlEvent::Characters(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            _ => {}
        }
    }
    root.ok_or(XmlError::Empty)
}

/// `xmlns:prefix` declarations that `scope` binds differently from `parent`.
/// Element prefixes are not kept, so these are what keeps prefixed attribute
/// names, XPath selects and identity values resolvable.
fn declared_prefixes(scope: &Namespace, parent: Option<&Namespace>) -> Vec<XmlAttribute> {
    scope
        .0
        .iter()
        .filter(|(prefix, _)| !matches!(prefix.as_str(), NS_NO_PREFIX | "xml" | "xmlns"))
        .filter(|(prefix, uri)| {
            parent.and_then(|parent| parent.get(prefix.as_str())) != Some(uri.as_str())
        })
        .map(|(prefix, uri)| XmlAttribute::new(format!("xmlns:{prefix}"), uri.as_str()))
        .collect()
}

/// Serializes an element tree. Child elements declare a default namespace
/// only where it differs from their parent's.
pub fn render(element: &XmlElement) -> String {
    let mut out = String::new();
    render_into(&mut out, element, None);
    out
}

pub fn render_into(out: &mut String, element: &XmlElement, inherited: Option<&str>) {
    let _ = write!(out, "<{}", element.name);
    let namespace = element.namespace.as_deref();
    match (namespace, inherited) {
        (Some(ns), _) if inherited != Some(ns) => {
            let _ = write!(out, " xmlns=\"{}\"", escape_str_attribute(ns));
        }
        (None, Some(_)) => out.push_str(" xmlns=\"\""),
        _ => {}
    }
    for attribute in &element.attributes {
        let _ = write!(
            out,
            " {}=\"{}\"",
            attribute.name,
            escape_str_attribute(&attribute.value)
        );
    }
    if element.children.is_empty() && element.text.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    out.push_str(&escape_str_pcdata(&element.text));
    for child in &element.children {
        render_into(out, child, namespace);
    }
    let _ = write!(out, "</{}>", element.name);
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

    #[test]
    fn parses_rpc_with_namespaces_and_text() {
        let doc = parse_document(
            br#"<?xml version="1.0"?>
            <rpc message-id="101" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
              <!-- kill it -->
              <kill-session><session-id>4</session-id></kill-session>
            </rpc>"#,
        )
        .unwrap();
        assert_eq!(doc.name, "rpc");
        assert_eq!(doc.namespace.as_deref(), Some(BASE_NS));
        assert_eq!(doc.attribute("message-id"), Some("101"));
        let op = doc.first_child().unwrap();
        assert_eq!(op.name, "kill-session");
        assert_eq!(op.child("session-id").unwrap().text(), "4");
    }

    #[test]
    fn prefix_declarations_stay_where_they_were_made() {
        let doc = parse_document(
            br#"<config xmlns:xc="urn:x"><top xc:operation="delete"/></config>"#,
        )
        .unwrap();
        assert_eq!(doc.attribute("xmlns:xc"), Some("urn:x"));
        let top = doc.first_child().unwrap();
        assert_eq!(top.attribute("xc:operation"), Some("delete"));
        assert!(top.attribute("xmlns:xc").is_none());
    }

    #[test]
    fn prefixed_xpath_filter_survives_a_round_trip() {
        let source = br#"<get-config xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><source><running/></source><filter type="xpath" xmlns:if="urn:ietf:params:xml:ns:yang:ietf-interfaces" select="/if:interfaces/if:interface"/></get-config>"#;
        let rendered = render(&parse_document(source).unwrap());
        assert!(
            rendered.contains(r#"xmlns:if="urn:ietf:params:xml:ns:yang:ietf-interfaces""#),
            "{rendered}"
        );
        let filter = parse_document(rendered.as_bytes())
            .unwrap()
            .child("filter")
            .cloned()
            .unwrap();
        assert_eq!(filter.attribute("select"), Some("/if:interfaces/if:interface"));
        assert_eq!(
            filter.attribute("xmlns:if"),
            Some("urn:ietf:params:xml:ns:yang:ietf-interfaces")
        );
    }

    #[test]
    fn prefixed_element_names_keep_identity_values_resolvable() {
        let doc = parse_document(
            br#"<if:interface xmlns:if="urn:if" xmlns:ianaift="urn:iana-if-type"><if:type>ianaift:ethernetCsmacd</if:type></if:interface>"#,
        )
        .unwrap();
        let rendered = render(&doc);
        assert!(rendered.starts_with("<interface xmlns=\"urn:if\""), "{rendered}");
        assert!(rendered.contains(r#"xmlns:ianaift="urn:iana-if-type""#));
        assert!(rendered.contains("<type>ianaift:ethernetCsmacd</type>"));
    }

    #[test]
    fn malformed_and_empty_documents_fail() {
        assert!(matches!(
            parse_document(b"<rpc><get></rpc>"),
            Err(XmlError::Syntax(_))
        ));
        assert!(parse_document(b"").is_err());
    }

    #[test]
    fn render_escapes_and_scopes_namespaces() {
        let element = XmlElement::new("rpc-reply")
            .with_namespace(BASE_NS)
            .with_attribute("message-id", "a\"b")
            .with_child(XmlElement::new("data").with_namespace(BASE_NS).with_text("1 < 2 & 3"))
            .with_child(XmlElement::new("top").with_namespace("urn:example"))
            .with_child(XmlElement::new("bare"));
        assert_eq!(
            render(&element),
            format!(
                "<rpc-reply xmlns=\"{BASE_NS}\" message-id=\"a&quot;b\">\
                 <data>1 &lt; 2 &amp; 3</data>\
                 <top xmlns=\"urn:example\"/>\
                 <bare xmlns=\"\"/>\
                 </rpc-reply>"
            )
        );
    }

    #[test]
    fn rendered_tree_parses_back() {
        let element = XmlElement::new("edit-config")
            .with_namespace(BASE_NS)
            .with_child(
                XmlElement::new("target")
                    .with_namespace(BASE_NS)
                    .with_child(XmlElement::new("running").with_namespace(BASE_NS)),
            );
        assert_eq!(parse_document(render(&element).as_bytes()).unwrap(), element);
    }
}
