//! Writes a generation to the wire as SSE frames.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chat_relay_core::{GenerationStream, codec};
use tokio_stream::StreamExt as _;
use tracing::debug;

use crate::config::StreamHeaders;

/// Streams every event of `generation` as one `data:` frame and closes the
/// body right after the terminal event.
///
/// Keep-alive comments, when enabled, are skipped by readers as noise. If the
/// client disconnects the body is dropped, which drops the generation and
/// stops the engine.
pub fn stream_response(
    generation: GenerationStream,
    headers: &StreamHeaders,
    keep_alive: Option<Duration>,
) -> Response {
    let request_id = generation.request_id();
    debug!(request_id = %request_id, "opening event stream");
    let frames = generation
        .into_event_stream()
        .map(|event| Ok::<_, Infallible>(Event::default().data(codec::encode_payload(&event))));

    let sse = Sse::new(frames);
    let mut response = match keep_alive {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => sse.into_response(),
    };
    headers.apply(response.headers_mut());
    response
}
