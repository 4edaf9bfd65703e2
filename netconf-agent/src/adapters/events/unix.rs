//! Event feed read from the management server's event socket.
//!
//! Each subscription opens its own connection, sends one JSON subscribe
//! line and then receives one JSON-encoded [`EventRecord`] per line until
//! the server closes the stream.

use crate::adapters::netconf::xml::render;
use crate::domain::rpc::{SubscriptionRequest, DEFAULT_STREAM};
use crate::ports::{EventRecord, EventSource, EventSourceError, EventStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SubscribeLine<'a> {
    stream: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UnixEventSource {
    path: PathBuf,
    streams: Vec<String>,
}

impl UnixEventSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            streams: vec![DEFAULT_STREAM.to_string()],
        }
    }

    pub fn with_streams(mut self, streams: Vec<String>) -> Self {
        if !streams.is_empty() {
            self.streams = streams;
        }
        self
    }
}

// The write half stays alive with the reader so the server does not see
// the subscription end early.
struct Feed {
    lines: Lines<BufReader<OwnedReadHalf>>,
    _subscription: OwnedWriteHalf,
}

async fn next_event(mut feed: Feed) -> Option<(Result<EventRecord, EventSourceError>, Feed)> {
    loop {
        match feed.lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                let event = serde_json::from_str::<EventRecord>(&line)
                    .map_err(|err| EventSourceError::Malformed(err.to_string()));
                return Some((event, feed));
            }
            Ok(None) => return None,
            Err(err) => return Some((Err(err.into()), feed)),
        }
    }
}

#[async_trait]
impl EventSource for UnixEventSource {
    fn streams(&self) -> Vec<String> {
        self.streams.clone()
    }

    async fn open(&self, request: &SubscriptionRequest) -> Result<EventStream, EventSourceError> {
        let stream = UnixStream::connect(&self.path).await.map_err(|err| {
            EventSourceError::Unavailable(format!("{}: {err}", self.path.display()))
        })?;
        let (read, mut write) = stream.into_split();

        let subscribe = SubscribeLine {
            stream: &request.stream,
            start_time: request.start_time,
            stop_time: request.stop_time,
            filter: request.filter.as_ref().map(render),
        };
        let mut line = serde_json::to_vec(&subscribe)
            .map_err(|err| EventSourceError::Malformed(err.to_string()))?;
        line.push(b'\n');
        write.write_all(&line).await?;
        write.flush().await?;
        debug!(path = %self.path.display(), stream = %request.stream, "event feed opened");

        let feed = Feed {
            lines: BufReader::new(read).lines(),
            _subscription: write,
        };
        Ok(futures::stream::unfold(feed, next_event).boxed())
    }
}
