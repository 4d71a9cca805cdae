//! OpenAI Responses API engine.
//!
//! Answer text streams on the [`MODEL_STAGE`]; reasoning summaries (requested
//! only when a reasoning effort is configured) stream on [`REASONING_STAGE`].
mod adapter;
mod config;
mod options;
pub(crate) mod transport;

pub use adapter::OpenAiEngine;
pub use config::{DEFAULT_MODEL, OpenAiEngineConfig};
pub use options::OpenAiReasoningEffort;
pub use transport::{MODEL_STAGE, REASONING_STAGE};
