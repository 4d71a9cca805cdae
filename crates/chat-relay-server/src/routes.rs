use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chat_relay_core::envelope::decode_request;
use chat_relay_core::{RequestEncoding, start_generation};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::emitter::stream_response;
use crate::error::ApiError;
use crate::state::AppState;

pub const CHAT_PATH: &str = "/api/chat";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(CHAT_PATH, post(chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "engine_configured": state.engine.is_some(),
    }))
}

/// `POST /api/chat`: decode, validate, start the generation, then stream.
///
/// Nothing is streamed until the request has been accepted, so every
/// rejection is a plain JSON error response.
async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let encoding = RequestEncoding::from_content_type(content_type);
    let request = decode_request(&body, encoding).map_err(|err| {
        warn!(error = %err, ?encoding, bytes = body.len(), "rejected chat request");
        ApiError::from(err)
    })?;

    let Some(engine) = state.engine.clone() else {
        warn!("chat request received but no engine is configured");
        return Err(ApiError::NotConfigured);
    };

    let messages = request.messages.len();
    let generation = start_generation(engine, request.messages, state.config.generation_options())
        .await
        .map_err(|err| {
            error!(error = %err, "failed to start generation");
            ApiError::from(err)
        })?;
    info!(
        request_id = %generation.request_id(),
        engine = %generation.engine(),
        messages,
        "streaming chat response"
    );

    Ok(stream_response(
        generation,
        &state.headers,
        state.config.keep_alive(),
    ))
}
