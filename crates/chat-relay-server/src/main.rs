use std::sync::Arc;

use anyhow::Context as _;
use chat_relay_core::GenerationEngine;
use chat_relay_core::observability::init_observability;
use chat_relay_core::vendors::openai::OpenAiEngine;
use chat_relay_server::{AppState, ServerConfig, serve};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load();
    init_observability();

    let engine: Option<Arc<dyn GenerationEngine>> = match OpenAiEngine::from_env() {
        Ok(engine) => {
            info!(model = engine.model(), "OpenAI engine configured");
            Some(Arc::new(engine))
        }
        Err(err) => {
            warn!(error = %err, "no chat engine configured; chat requests will get 503");
            None
        }
    };

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %listener.local_addr()?, answer_stage = %config.answer_stage, "chat relay listening");

    serve(listener, AppState::new(config, engine), shutdown_signal()).await?;
    info!("chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            warn!(error = %err, "failed to listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
