use std::convert::Infallible;
use std::time::Duration;

use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use events::WorkerEvent;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Events buffered between a session and its client. Kept small so a slow
/// client applies backpressure to the session instead of queueing output.
pub const SESSION_CHANNEL_CAPACITY: usize = 32;

static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

fn worker_event_to_sse_event(event: &WorkerEvent) -> Result<Event, Infallible> {
    // Unnamed events, so browser `onmessage` handlers receive every record.
    Ok(Event::default().data(event.to_json()))
}

/// Stream a session's events to the client as they are produced.
///
/// Dropping the response (client disconnect) drops the receiver, which the
/// session observes as cancellation.
pub fn event_stream(rx: mpsc::Receiver<WorkerEvent>) -> Response {
    let stream = ReceiverStream::new(rx).map(|event| worker_event_to_sse_event(&event));

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    );

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING.clone(), "no"),
        ],
        sse,
    )
        .into_response()
}
