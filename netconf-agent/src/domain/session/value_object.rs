use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";
pub const NOTIFICATION_1_0: &str = "urn:ietf:params:netconf:capability:notification:1.0";
pub const INTERLEAVE_1_0: &str = "urn:ietf:params:netconf:capability:interleave:1.0";

const PROTOCOL_CAPABILITY_PREFIX: &str = "urn:ietf:params:netconf:";

/// NETCONF session identifier. RFC 6241 reserves zero, so it is rejected here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    pub fn new(value: u32) -> Result<Self, String> {
        if value == 0 {
            return Err("session-id must be a positive integer".to_string());
        }
        Ok(Self(value))
    }

    /// One agent process serves exactly one session, so the pid is unique
    /// among the agents spawned by the same front end.
    pub fn for_current_process() -> Self {
        Self(std::process::id().max(1))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = value
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid session-id '{value}': {err}"))?;
        Self::new(parsed)
    }
}

impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u32::deserialize(deserializer)?;
        SessionId::new(value).map_err(D::Error::custom)
    }
}

/// A capability URI as exchanged in `<hello>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Capability(String);

impl Capability {
    pub fn new(uri: impl Into<String>) -> Result<Self, String> {
        let uri = uri.into();
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err("capability URI cannot be empty".to_string());
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(format!("capability URI '{trimmed}' contains whitespace"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URI without the `?module=...` query part.
    pub fn base_uri(&self) -> &str {
        self.0.split('?').next().unwrap_or(&self.0)
    }

    pub fn is_base(&self) -> bool {
        matches!(self.base_uri(), BASE_1_0 | BASE_1_1)
    }

    /// Base and `:capability:` URIs describe protocol behaviour both peers
    /// must agree on; everything else (modules, features) is server-owned.
    pub fn is_protocol(&self) -> bool {
        self.base_uri().starts_with(PROTOCOL_CAPABILITY_PREFIX)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Capability {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Capability::new(value).map_err(D::Error::custom)
    }
}

/// Ordered, duplicate-free list of capabilities.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(Vec<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_uris<I, S>(uris: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for uri in uris {
            set.insert(Capability::new(uri)?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, capability: Capability) {
        if !self.0.contains(&capability) {
            self.0.push(capability);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    /// Matches on the base URI so `?module=` parameters do not matter.
    pub fn contains(&self, uri: &str) -> bool {
        let wanted = uri.split('?').next().unwrap_or(uri);
        self.0.iter().any(|cap| cap.base_uri() == wanted)
    }

    pub fn has_base(&self) -> bool {
        self.0.iter().any(Capability::is_base)
    }

    pub fn supports_notifications(&self) -> bool {
        self.contains(NOTIFICATION_1_0)
    }

    /// Intersects protocol capabilities with what the client advertised and
    /// keeps server-only module capabilities.
    pub fn negotiate(&self, client: &CapabilitySet) -> CapabilitySet {
        let mut negotiated = CapabilitySet::new();
        for capability in &self.0 {
            if !capability.is_protocol() || client.contains(capability.base_uri()) {
                negotiated.insert(capability.clone());
            }
        }
        negotiated
    }

    pub fn to_uris(&self) -> Vec<String> {
        self.0.iter().map(|cap| cap.as_str().to_string()).collect()
    }
}
