//! Server-Sent Events for streamed turns

use crate::chat::{ChatError, TurnEvent, TurnStream};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;

/// Convert a turn's progress into an SSE response.
///
/// Emits `delta` events while the reply arrives, then exactly one `done` or
/// `error` event.
pub fn turn_sse(
    thread_id: String,
    events: TurnStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = events.map(move |event| Ok(turn_event_to_axum(&thread_id, event)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn turn_event_to_axum(thread_id: &str, event: TurnEvent) -> Event {
    let (event_type, data) = match event {
        TurnEvent::Delta(text) => (
            "delta",
            json!({
                "type": "delta",
                "text": text
            }),
        ),
        TurnEvent::Completed(outcome) => (
            "done",
            json!({
                "type": "done",
                "thread_id": thread_id,
                "user": outcome.user,
                "assistant": outcome.assistant
            }),
        ),
        TurnEvent::Failed(error) => (
            "error",
            json!({
                "type": "error",
                "thread_id": thread_id,
                "kind": error_kind(&error),
                "message": error.to_string()
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}

fn error_kind(error: &ChatError) -> &'static str {
    match error {
        ChatError::StorageUnavailable(_) => "storage_unavailable",
        ChatError::ModelUnavailable(_) => "model_unavailable",
        ChatError::UnknownThread(_) => "unknown_thread",
        ChatError::EmptyMessage => "empty_message",
    }
}
