/// Logical unit carried by one frame of the relay stream.
///
/// A well-formed stream is zero or more `Token` events followed by exactly one
/// terminal event (`Done` or `Error`). Nothing follows a terminal event.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Incremental fragment of the answer.
    Token { content: String },
    /// Successful end of the stream.
    Done,
    /// Failed end of the stream. The message is generic and safe to display.
    Error { message: String },
}

impl StreamEvent {
    pub fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}
