use std::sync::Arc;

use chat_relay_core::GenerationEngine;

use crate::config::{ServerConfig, StreamHeaders};

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub headers: Arc<StreamHeaders>,
    /// `None` when credentials were missing at startup; chat requests then get 503.
    pub engine: Option<Arc<dyn GenerationEngine>>,
}

impl AppState {
    pub fn new(config: ServerConfig, engine: Option<Arc<dyn GenerationEngine>>) -> Self {
        Self {
            config: Arc::new(config),
            headers: Arc::new(StreamHeaders::default()),
            engine,
        }
    }
}
