//! HTTP surface of the chat relay: `POST /api/chat` streams a generation as
//! SSE frames, `GET /health` reports readiness.

pub mod config;
pub mod emitter;
pub mod error;
pub mod routes;
pub mod state;

use std::future::Future;

use tokio::net::TcpListener;

pub use config::{ServerConfig, StreamHeaders};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

/// Serves the relay on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
