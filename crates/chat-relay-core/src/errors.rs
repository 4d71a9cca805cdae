use crate::engine::EngineId;

/// Errors raised by a model-invocation engine.
///
/// Messages may contain provider text and are for logs only; the relay never
/// forwards them to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Credentials or other required configuration are missing or invalid.
    #[error("engine config error: {0}")]
    Config(String),
    /// Provider returned an application-level failure (HTTP status, quota, etc.).
    #[error("provider error ({engine}): {message}")]
    Provider {
        engine: EngineId,
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error ({engine}): {message}")]
    Transport { engine: EngineId, message: String },
    /// Provider response shape or event sequencing was invalid.
    #[error("protocol error ({engine}): {message}")]
    Protocol { engine: EngineId, message: String },
}

impl EngineError {
    /// Creates a provider-level error.
    pub fn provider(
        engine: impl Into<EngineId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            engine: engine.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(engine: impl Into<EngineId>, message: impl Into<String>) -> Self {
        Self::Transport {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(engine: impl Into<EngineId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// True when the failure is missing/invalid configuration rather than a
    /// runtime fault.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Errors returned by `start_generation` before any event is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Caller input was rejected (for example an empty message list).
    #[error("validation error: {0}")]
    Validation(String),
    /// Generation options are unusable; a server-side fault, not the caller's.
    #[error("invalid generation options: {0}")]
    InvalidOptions(String),
    /// The engine could not start the generation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
