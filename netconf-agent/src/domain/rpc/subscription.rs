use super::element::XmlElement;
use super::operation::RpcUnit;
use super::reply::{ErrorTag, ErrorType, RpcError};
use chrono::{DateTime, Utc};

pub const DEFAULT_STREAM: &str = "NETCONF";

/// Validated parameters of a `create-subscription` request (RFC 5277).
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionRequest {
    pub stream: String,
    pub filter: Option<XmlElement>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}

impl SubscriptionRequest {
    pub fn from_rpc(
        rpc: &RpcUnit,
        streams: &[String],
        now: DateTime<Utc>,
    ) -> Result<Self, RpcError> {
        let content = rpc
            .content()
            .filter(|content| content.name == "create-subscription")
            .ok_or_else(|| {
                RpcError::new(ErrorTag::OperationFailed)
                    .with_message("Corrupted create-subscription request.")
            })?;

        let stream = match content.child("stream") {
            Some(element) => element.text().to_string(),
            None => DEFAULT_STREAM.to_string(),
        };
        if !streams.iter().any(|known| *known == stream) {
            return Err(RpcError::new(ErrorTag::InvalidValue)
                .with_type(ErrorType::Protocol)
                .with_bad_element("stream")
                .with_message(format!("Requested stream '{stream}' does not exist.")));
        }

        let start_time = parse_time(content, "startTime")?;
        let stop_time = parse_time(content, "stopTime")?;

        if let Some(start) = start_time {
            if start > now {
                return Err(bad_time("startTime", "startTime is in the future."));
            }
        }
        match (start_time, stop_time) {
            (None, Some(_)) => {
                return Err(bad_time("stopTime", "stopTime requires startTime."));
            }
            (Some(start), Some(stop)) if stop < start => {
                return Err(bad_time("stopTime", "stopTime precedes startTime."));
            }
            _ => {}
        }

        Ok(Self {
            stream,
            filter: content.child("filter").map(|filter| {
                let mut filter = filter.clone();
                filter.inherit_declarations(&content.attributes);
                filter
            }),
            start_time,
            stop_time,
        })
    }

    pub fn is_replay(&self) -> bool {
        self.start_time.is_some()
    }
}

fn parse_time(content: &XmlElement, name: &str) -> Result<Option<DateTime<Utc>>, RpcError> {
    let Some(element) = content.child(name) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(element.text())
        .map(|value| Some(value.with_timezone(&Utc)))
        .map_err(|err| bad_time(name, &format!("Invalid {name} value: {err}.")))
}

fn bad_time(element: &str, message: &str) -> RpcError {
    RpcError::new(ErrorTag::BadElement)
        .with_type(ErrorType::Protocol)
        .with_bad_element(element)
        .with_message(message)
}
