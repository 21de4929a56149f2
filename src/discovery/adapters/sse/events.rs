//! Server-sent events decoded with `eventsource-stream`, bounded in size.

use crate::discovery::adapters::jsonrpc::MAX_MESSAGE_SIZE;
use crate::discovery::ports::{SessionError, SessionResult};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};

const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub(crate) event: String,
    pub(crate) data: String,
}

/// Decodes a byte stream into events. Transport failures surface as
/// [`SessionError::Io`]; unparsable or oversized events as
/// [`SessionError::Malformed`].
pub(crate) fn decode_events<S, B>(body: S) -> impl Stream<Item = SessionResult<SseEvent>>
where
    S: Stream<Item = Result<B, String>>,
    B: AsRef<[u8]>,
{
    body.eventsource().map(|item| match item {
        Ok(event) => bounded(event.event, event.data),
        Err(EventStreamError::Transport(message)) => Err(SessionError::Io(message)),
        Err(other) => Err(SessionError::Malformed(other.to_string())),
    })
}

fn bounded(event: String, data: String) -> SessionResult<SseEvent> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(SessionError::Malformed(format!(
            "event exceeds the {MAX_MESSAGE_SIZE} byte limit"
        )));
    }
    let event = if event.is_empty() {
        DEFAULT_EVENT.to_owned()
    } else {
        event
    };
    Ok(SseEvent { event, data })
}
