/// Environment variable through which the TLS terminator passes the client
/// certificate subject.
pub const TLS_CLIENT_DN_ENV: &str = "SSL_CLIENT_DN";

const COMMON_NAME_MARKER: &str = "CN=";
const FIELD_SEPARATOR: char = '/';

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("client certificate subject has no commonName")]
    MissingCommonName,
    #[error("client certificate commonName is empty")]
    EmptyCommonName,
}

/// Extracts the username from an OpenSSL one-line subject such as
/// `/C=CZ/O=Example/CN=alice/emailAddress=alice@example.org`.
pub fn username_from_dn(subject: &str) -> Result<String, IdentityError> {
    let start = subject
        .find(COMMON_NAME_MARKER)
        .ok_or(IdentityError::MissingCommonName)?
        + COMMON_NAME_MARKER.len();
    let rest = &subject[start..];
    let value = match rest.find(FIELD_SEPARATOR) {
        Some(end) => &rest[..end],
        None => rest,
    };
    if value.is_empty() {
        return Err(IdentityError::EmptyCommonName);
    }
    Ok(value.to_string())
}
