//! SSE encoding of chat turn streams.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use crate::streaming::{ChunkStream, TurnChunk};

/// Message sent in place of error details when errors are masked.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Options for SSE encoding.
#[derive(Debug, Clone)]
pub struct SseOptions {
    /// Whether to mask error messages for security.
    ///
    /// When `true`, replaces the error text of a failed turn with
    /// `masked_error_message` (or [`GENERIC_ERROR_MESSAGE`]).
    /// Default: `true`
    pub mask_errors: bool,

    /// Custom error message to use when `mask_errors` is `true`.
    /// Default: `None`
    pub masked_error_message: Option<String>,

    /// Interval of keep-alive comments while the assistant is quiet, for
    /// example while tool outputs are being submitted. `None` disables them.
    /// Default: 15 seconds
    pub keep_alive: Option<Duration>,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            mask_errors: true,
            masked_error_message: None,
            keep_alive: Some(Duration::from_secs(15)),
        }
    }
}

impl SseOptions {
    /// Create options suitable for development (errors not masked).
    pub fn development() -> Self {
        Self {
            mask_errors: false,
            ..Default::default()
        }
    }

    fn error_text(&self, message: String) -> String {
        if self.mask_errors {
            self.masked_error_message
                .clone()
                .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string())
        } else {
            message
        }
    }
}

/// Encode a single chunk. Text and the completion marker become plain
/// `data:` events; a failure becomes `event: error` with a JSON body.
pub fn encode_chunk(chunk: TurnChunk, opts: &SseOptions) -> Event {
    match chunk {
        TurnChunk::Text(text) | TurnChunk::Done(text) => Event::default().data(sanitize(&text)),
        TurnChunk::Error(message) => {
            let data = serde_json::json!({ "error": opts.error_text(message) });
            Event::default().event("error").data(data.to_string())
        }
    }
}

/// Carriage returns cannot be carried inside an SSE field; normalize them to
/// line feeds, which the client reassembles from the `data:` lines.
fn sanitize(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    }
}

/// Convert a chat turn stream into an Axum SSE response.
pub fn to_sse_response(stream: ChunkStream, opts: SseOptions) -> Response {
    let keep_alive = opts.keep_alive;
    let events = stream.map(move |chunk| Ok::<_, Infallible>(encode_chunk(chunk, &opts)));

    let sse = Sse::new(events);
    match keep_alive {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => sse.into_response(),
    }
}
