use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chat_relay_core::{EnvelopeError, GenerationError};

/// Failures reported before a stream is opened.
///
/// Messages are fixed strings; underlying causes are logged by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("invalid payload")]
    InvalidPayload,
    #[error("messages must be a non-empty list")]
    EmptyMessages,
    #[error("chat backend is not configured")]
    NotConfigured,
    #[error("failed to start generation")]
    Internal,
}

impl ApiError {
    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidPayload | Self::EmptyMessages => StatusCode::BAD_REQUEST,
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EnvelopeError> for ApiError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::InvalidPayload => Self::InvalidPayload,
            EnvelopeError::EmptyMessages => Self::EmptyMessages,
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Validation(_) => Self::EmptyMessages,
            GenerationError::InvalidOptions(_) => Self::Internal,
            GenerationError::Engine(engine) if engine.is_config() => Self::NotConfigured,
            GenerationError::Engine(_) => Self::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
