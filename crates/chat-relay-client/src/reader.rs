//! Reassembles the relay's SSE frames from an arbitrarily chunked body.

use std::fmt;

use chat_relay_core::codec::{self, FrameBuffer};
use chat_relay_core::{StreamChatResult, StreamEvent};
use futures::{Stream, StreamExt as _};
use tracing::{debug, trace, warn};

use crate::abort::AbortSignal;

/// Result message when a stream ends cleanly without any answer text.
pub const NO_CONTENT_MESSAGE: &str = "The assistant returned an empty response.";
/// Result message for network failures and rejected requests.
pub const REQUEST_FAILED_MESSAGE: &str = "Unable to get a response from the chat service.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Reading,
    Completed,
    Aborted,
    Failed,
}

/// Incremental decoder for one response body.
///
/// Feed byte chunks with [`push_chunk`](Self::push_chunk) and close with
/// [`finish`](Self::finish). `on_token` receives each fragment together with
/// the text accumulated so far.
pub struct StreamReader<F> {
    buffer: FrameBuffer,
    content: String,
    error: Option<String>,
    terminal: bool,
    state: ReaderState,
    on_token: F,
}

impl<F> StreamReader<F>
where
    F: FnMut(&str, &str),
{
    pub fn new(on_token: F) -> Self {
        Self {
            buffer: FrameBuffer::default(),
            content: String::new(),
            error: None,
            terminal: false,
            state: ReaderState::Idle,
            on_token,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Text accumulated from `Token` events so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        if self.state == ReaderState::Idle {
            self.state = ReaderState::Reading;
        }
        for frame in self.buffer.push_chunk(chunk) {
            self.dispatch(&frame);
        }
    }

    fn dispatch(&mut self, frame: &str) {
        let Some(event) = codec::decode(frame) else {
            trace!(bytes = frame.len(), "skipping frame without a decodable event");
            return;
        };
        if self.terminal {
            debug!("ignoring event received after the terminal event");
            return;
        }
        match event {
            StreamEvent::Token { content } => {
                self.content.push_str(&content);
                (self.on_token)(&content, &self.content);
            }
            StreamEvent::Error { message } => {
                self.error = Some(message);
                self.terminal = true;
            }
            StreamEvent::Done => self.terminal = true,
        }
    }

    /// Decodes any trailing fragment and computes the final result.
    pub fn finish(&mut self) -> StreamChatResult {
        if let Some(rest) = self.buffer.finish() {
            self.dispatch(&rest);
        }
        if let Some(message) = self.error.clone() {
            return self.fail(message);
        }
        if self.content.is_empty() {
            return self.fail(NO_CONTENT_MESSAGE);
        }
        self.state = ReaderState::Completed;
        StreamChatResult::Ok {
            content: self.content.clone(),
        }
    }

    /// Stops reading and keeps the partial answer.
    pub fn abort(&mut self) -> StreamChatResult {
        self.state = ReaderState::Aborted;
        StreamChatResult::Aborted {
            content: self.content.clone(),
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) -> StreamChatResult {
        self.state = ReaderState::Failed;
        StreamChatResult::Error {
            content: self.content.clone(),
            message: message.into(),
        }
    }
}

/// Reads a response body to completion.
///
/// Cancellation is observed while waiting for each chunk; once it fires no
/// further chunk is read and the partial answer is returned as `Aborted`. A
/// body read failure keeps the partial answer and reports
/// [`REQUEST_FAILED_MESSAGE`].
pub async fn read_event_stream<S, B, E, F>(
    byte_stream: S,
    abort: &AbortSignal,
    on_token: F,
) -> StreamChatResult
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    F: FnMut(&str, &str),
{
    let mut reader = StreamReader::new(on_token);
    let mut byte_stream = std::pin::pin!(byte_stream);

    loop {
        if abort.is_aborted() {
            debug!(chars = reader.content().len(), "read aborted");
            return reader.abort();
        }
        let next = tokio::select! {
            biased;
            _ = abort.aborted() => {
                debug!(chars = reader.content().len(), "read aborted while waiting for data");
                return reader.abort();
            }
            next = byte_stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => reader.push_chunk(chunk.as_ref()),
            Some(Err(err)) => {
                warn!(error = %err, "response body read failed");
                return reader.fail(REQUEST_FAILED_MESSAGE);
            }
            None => return reader.finish(),
        }
    }
}
