use std::net::SocketAddr;
use std::time::Duration;

use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chat_relay_core::GenerationOptions;
use chat_relay_core::generation::DEFAULT_ANSWER_STAGE;
use clap::Parser;

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
const DEFAULT_STREAM_BUFFER: usize = 128;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;

/// Relay settings, read once at startup from flags or `CHAT_RELAY_*` variables.
#[derive(Parser, Clone, Debug)]
#[command(name = "chat-relay-server", version, about = "Streams chat completions as SSE frames")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "CHAT_RELAY_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Engine stage whose fragments are streamed as the answer.
    #[arg(long, env = "CHAT_RELAY_ANSWER_STAGE", default_value = DEFAULT_ANSWER_STAGE)]
    pub answer_stage: String,

    /// Events buffered between a generation and its response body.
    #[arg(long, env = "CHAT_RELAY_STREAM_BUFFER", default_value_t = DEFAULT_STREAM_BUFFER, value_parser = parse_positive)]
    pub stream_buffer: usize,

    /// Upper bound on one generation, in seconds. Unset means no limit.
    #[arg(long, env = "CHAT_RELAY_GENERATION_TIMEOUT_SECS")]
    pub generation_timeout_secs: Option<u64>,

    /// Interval between SSE keep-alive comments; 0 disables them.
    #[arg(long, env = "CHAT_RELAY_KEEP_ALIVE_SECS", default_value_t = DEFAULT_KEEP_ALIVE_SECS)]
    pub keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            answer_stage: DEFAULT_ANSWER_STAGE.to_string(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            generation_timeout_secs: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

impl ServerConfig {
    /// Loads `.env` (if present) and parses flags and environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn generation_options(&self) -> GenerationOptions {
        let options = GenerationOptions::default()
            .answer_stage(self.answer_stage.clone())
            .buffer_capacity(self.stream_buffer);
        match self.generation_timeout_secs {
            Some(secs) if secs > 0 => options.timeout(Duration::from_secs(secs)),
            _ => options,
        }
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("must be greater than 0".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Headers added to every streaming response so proxies neither cache nor
/// buffer it.
#[derive(Clone, Debug)]
pub struct StreamHeaders {
    headers: HeaderMap,
}

impl Default for StreamHeaders {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-transform"),
        );
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );
        Self { headers }
    }
}

impl StreamHeaders {
    /// Overwrites each configured header on `target`.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}
