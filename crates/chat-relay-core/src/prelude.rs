//! Frequently used relay types in one import.
pub use crate::{
    ChatMessage, ChatRequest, EngineError, GenerationEngine, GenerationError, GenerationOptions,
    GenerationStream, Role, StreamChatResult, StreamEvent, codec, start_generation,
};
