//! Client side of the chat relay.
//!
//! [`ChatClient::stream_chat_response`] posts a conversation and feeds every
//! streamed fragment to a callback; the returned [`StreamChatResult`] carries
//! the accumulated answer whether the stream completed, failed or was aborted.
//!
//! [`StreamChatResult`]: chat_relay_core::StreamChatResult

pub mod abort;
pub mod client;
pub mod reader;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use client::{ChatClient, ClientConfig, ClientError};
pub use reader::{
    NO_CONTENT_MESSAGE, REQUEST_FAILED_MESSAGE, ReaderState, StreamReader, read_event_stream,
};
