use std::time::Duration;

use chat_relay_core::envelope::encode_request;
use chat_relay_core::observability::parse_bool_env;
use chat_relay_core::{ChatMessage, ChatRequest, RequestEncoding, StreamChatResult};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::abort::AbortSignal;
use crate::reader::{REQUEST_FAILED_MESSAGE, read_event_stream};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787/api/chat";

/// Where and how chat requests are sent.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Full URL of the relay's chat route.
    pub endpoint: String,
    pub request_encoding: RequestEncoding,
    /// Bounds connection setup only; an open stream may stay idle indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_encoding: RequestEncoding::Encoded,
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Reads `CHAT_RELAY_URL` and `CHAT_RELAY_PLAIN_JSON`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("CHAT_RELAY_URL")
            && !url.trim().is_empty()
        {
            config.endpoint = url.trim().to_string();
        }
        if let Ok(flag) = std::env::var("CHAT_RELAY_PLAIN_JSON")
            && parse_bool_env(&flag) == Some(true)
        {
            config.request_encoding = RequestEncoding::PlainJson;
        }
        config
    }

    pub fn request_encoding(mut self, encoding: RequestEncoding) -> Self {
        self.request_encoding = encoding;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Sends chat requests to the relay and reads the streamed answer.
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            config,
        })
    }

    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env())
    }

    /// Posts `messages` and streams the answer into `on_token`.
    ///
    /// Never fails: rejected requests and network errors come back as
    /// `StreamChatResult::Error` with a generic message, cancellation as
    /// `StreamChatResult::Aborted`.
    pub async fn stream_chat_response<F>(
        &self,
        messages: Vec<ChatMessage>,
        abort: &AbortSignal,
        on_token: F,
    ) -> StreamChatResult
    where
        F: FnMut(&str, &str),
    {
        if abort.is_aborted() {
            return StreamChatResult::Aborted {
                content: String::new(),
            };
        }

        let encoding = self.config.request_encoding;
        let body = match encode_request(&ChatRequest { messages }, encoding) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "failed to encode chat request");
                return request_failed();
            }
        };

        debug!(endpoint = %self.config.endpoint, ?encoding, "sending chat request");
        let send = self
            .http
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, encoding.content_type())
            .header(ACCEPT, "text/event-stream")
            .body(body)
            .send();
        let response = tokio::select! {
            biased;
            _ = abort.aborted() => {
                return StreamChatResult::Aborted { content: String::new() };
            }
            response = send => response,
        };

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "chat request rejected");
                return request_failed();
            }
            Err(err) => {
                warn!(error = %err, "chat request failed");
                return request_failed();
            }
        };

        read_event_stream(response.bytes_stream(), abort, on_token).await
    }
}

fn request_failed() -> StreamChatResult {
    StreamChatResult::Error {
        content: String::new(),
        message: REQUEST_FAILED_MESSAGE.to_string(),
    }
}
