//! Core of the chat relay: the SSE frame codec, request/result envelopes,
//! the engine contract and the generation orchestrator.
//!
//! The server crate streams [`StreamEvent`]s produced by [`start_generation`];
//! the client crate decodes them back with [`codec::FrameBuffer`] and
//! [`codec::decode`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chat_relay_core::prelude::*;
//! use chat_relay_core::vendors::openai::OpenAiEngine;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), GenerationError> {
//! let engine: Arc<dyn GenerationEngine> = Arc::new(OpenAiEngine::from_env()?);
//! let mut generation = start_generation(
//!     engine,
//!     vec![ChatMessage::user("Say hello")],
//!     GenerationOptions::default(),
//! )
//! .await?;
//!
//! while let Some(event) = generation.next_event().await {
//!     print!("{}", codec::encode(&event));
//! }
//! # Ok(())
//! # }
//! ```

/// SSE frame encoding and incremental decoding.
pub mod codec;
/// Chat messages and engine content values.
pub mod content;
/// Engine contract and channel types.
pub mod engine;
/// Request body and result envelopes.
pub mod envelope;
/// Public error types.
pub mod errors;
/// Turns engine channels into the client-facing event sequence.
pub mod generation;
/// Process-wide logging setup.
pub mod observability;
/// Common imports.
pub mod prelude;
/// Events carried inside frames.
pub mod stream;
/// Concrete engine integrations.
pub mod vendors;

pub use content::{ChatMessage, ContentPart, MessageContent, Role};
pub use engine::{
    ChannelItem, EngineId, EngineRequest, EngineStream, GenerationEngine, PrimaryChunk,
    StageSnapshot, StageUpdate, merge_channels,
};
pub use envelope::{ChatRequest, EnvelopeError, RequestEncoding, StreamChatResult};
pub use errors::{EngineError, GenerationError};
pub use generation::{
    GenerationOptions, GenerationOutcome, GenerationStream, GenerationSummary, start_generation,
};
pub use observability::init_observability;
pub use stream::StreamEvent;
