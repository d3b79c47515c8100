//! WebSocket-fed event source.
//!
//! Streams a backend's `/projects/{id}/events` push endpoint into the registry.
//! Frames that fail to decode are dropped and logged; the connection is retried
//! with exponential backoff until the channel is torn down.

use std::time::Duration;

use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::protocol::ChannelEvent;
use super::registry::EventSink;
use super::source::{EventSource, SourceHandle};
use crate::{Error, Result};

/// Reconnect attempts after a dropped or refused connection
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Longest wait between reconnect attempts
pub const MAX_BACKOFF_SECS: u64 = 8;

/// Wait before reconnect attempt `attempt` (1-based): 0s, 1s, 2s, 4s, then 8s.
pub fn reconnect_backoff(attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    let secs = 1u64 << (attempt - 2).min(3);
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

/// Push endpoint for `project_id` on the backend at `server_url`.
pub fn events_url(server_url: &str, project_id: &str) -> Result<String> {
    let base = server_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(Error::Config(format!(
            "server-url must start with http://, https://, ws:// or wss://, got '{}'",
            server_url
        )));
    };
    Ok(format!("{}/projects/{}/events", ws_base, project_id))
}

/// [`EventSource`] reading events from a remote backend.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    server_url: String,
}

impl RemoteSource {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }
}

impl EventSource for RemoteSource {
    fn start(&self, project_id: &str, sink: EventSink) -> Result<SourceHandle> {
        let url = events_url(&self.server_url, project_id)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let task = runtime.spawn(pump(url, sink));
        Ok(SourceHandle::from_task(task))
    }
}

async fn pump(url: String, sink: EventSink) {
    let mut attempt = 0u32;
    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                info!(url = %url, "connected to event stream");
                attempt = 0;
                let (_write, mut read) = stream.split();
                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(Message::Text(text)) => match ChannelEvent::decode(&text) {
                            Ok(event) => {
                                if !sink.emit(event) {
                                    debug!(url = %url, "channel closed, leaving event stream");
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "dropping malformed event frame"),
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "event stream read failed");
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!(url = %url, error = %e, "event stream connection failed"),
        }

        if sink.is_closed() {
            return;
        }
        attempt += 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            error!(url = %url, "giving up on event stream after {} attempts", MAX_RECONNECT_ATTEMPTS);
            return;
        }
        tokio::time::sleep(reconnect_backoff(attempt)).await;
    }
}
