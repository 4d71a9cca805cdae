use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::codec::{FrameBuffer, parse_sse_fields};
use crate::content::{ChatMessage, Role};
use crate::engine::{ChannelItem, EngineId, EngineRequest, EngineStream, GenerationEngine};
use crate::errors::EngineError;

use super::config::OpenAiEngineConfig;
use super::transport::map_openai_frame;

const OPENAI_ENGINE: &str = "openai";

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Engine backed by OpenAI's Responses API (streaming).
///
/// Answer deltas arrive on the primary channel under the `model` stage,
/// reasoning summaries under the `reasoning` stage, and the completed
/// response is published once on the secondary channel.
pub struct OpenAiEngine {
    client: reqwest::Client,
    config: OpenAiEngineConfig,
}

impl OpenAiEngine {
    /// Creates an engine from explicit configuration.
    pub fn new(config: OpenAiEngineConfig) -> Result<Self, EngineError> {
        if config.api_key.trim().is_empty() {
            return Err(EngineError::Config(
                "OpenAI engine config api_key must not be empty".into(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(EngineError::Config(
                "OpenAI engine config model must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build OpenAI client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates an engine using `OPENAI_API_KEY` and friends.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::new(OpenAiEngineConfig::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait::async_trait]
impl GenerationEngine for OpenAiEngine {
    fn id(&self) -> EngineId {
        EngineId::new(OPENAI_ENGINE)
    }

    async fn invoke(&self, req: EngineRequest) -> Result<EngineStream, EngineError> {
        let engine_id = self.id();
        let body = build_request_body(&req.messages, &self.config);
        debug!(request_id = %req.request_id, model = %self.config.model, "starting OpenAI responses stream");

        let response = self
            .client
            .post(self.config.responses_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                EngineError::transport(engine_id.clone(), format!("OpenAI request failed: {e}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = format!("OpenAI responses request failed with status {status}: {body}");
            return Err(match status.as_u16() {
                401 | 403 => EngineError::Config(message),
                code => EngineError::provider(engine_id, message, Some(code)),
            });
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(openai_event_stream(engine_id, bytes_stream)))
    }
}

pub(crate) fn build_request_body(
    messages: &[ChatMessage],
    config: &OpenAiEngineConfig,
) -> serde_json::Value {
    let input: Vec<serde_json::Value> = messages
        .iter()
        .map(|message| {
            let role = match message.role {
                Role::System => "developer",
                other => other.as_str(),
            };
            serde_json::json!({
                "role": role,
                "content": message.content,
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": config.model,
        "input": input,
        "stream": true,
        "store": false,
    });

    if let Some(effort) = config.reasoning_effort {
        body["reasoning"] = serde_json::json!({ "effort": effort, "summary": "auto" });
    }

    body
}

fn openai_event_stream(
    engine_id: EngineId,
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<ChannelItem, EngineError>> + Send {
    struct State {
        engine_id: EngineId,
        bytes_stream: ByteStream,
        buffer: FrameBuffer,
        pending: VecDeque<ChannelItem>,
        done: bool,
    }

    impl State {
        fn queue_frame(&mut self, raw: &str) -> Result<(), EngineError> {
            if let Some(frame) = parse_sse_fields(raw) {
                self.pending
                    .extend(map_openai_frame(&self.engine_id, &frame)?);
            }
            Ok(())
        }
    }

    stream::try_unfold(
        State {
            engine_id,
            bytes_stream,
            buffer: FrameBuffer::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Ok(Some((item, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for raw in state.buffer.push_chunk(&chunk) {
                            state.queue_frame(&raw)?;
                        }
                    }
                    Some(Err(e)) => {
                        return Err(EngineError::transport(
                            state.engine_id,
                            format!("OpenAI streaming read failed: {e}"),
                        ));
                    }
                    None => {
                        state.done = true;
                        if let Some(raw) = state.buffer.finish() {
                            state.queue_frame(&raw)?;
                        }
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt as _;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    use super::*;
    use crate::engine::PrimaryChunk;
    use crate::vendors::openai::OpenAiReasoningEffort;
    use crate::vendors::openai::transport::{MODEL_STAGE, REASONING_STAGE};

    fn bytes_of(chunks: &[&str]) -> ByteStream {
        let owned: Vec<Result<bytes::Bytes, reqwest::Error>> = chunks
            .iter()
            .map(|chunk| Ok(bytes::Bytes::from(chunk.to_string())))
            .collect();
        Box::pin(stream::iter(owned))
    }

    #[test]
    fn request_body_maps_roles_and_defaults() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hello")];
        let body = build_request_body(&messages, &OpenAiEngineConfig::new("k"));
        assert_eq!(body.get("stream").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(body.get("store").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(body["input"][0]["role"], "developer");
        assert_eq!(body["input"][1], serde_json::json!({"role": "user", "content": "hello"}));
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn reasoning_effort_requests_summaries() {
        let config = OpenAiEngineConfig::new("k").reasoning_effort(OpenAiReasoningEffort::Low);
        let body = build_request_body(&[ChatMessage::user("hi")], &config);
        assert_eq!(body["reasoning"]["effort"], "low");
        assert_eq!(body["reasoning"]["summary"], "auto");
    }

    #[test]
    fn empty_api_key_is_config_error() {
        assert!(matches!(
            OpenAiEngine::new(OpenAiEngineConfig::new("  ")),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn event_stream_maps_chunked_sse_into_channel_items() {
        let wire = concat!(
            "event: response.reasoning_summary_text.delta\n",
            "data: {\"type\":\"response.reasoning_summary_text.delta\",\"delta\":\"plan\"}\n\n",
            "event: response.output_text.delta\n",
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hi\"}\n\n",
            "data: {\"type\":\"response.completed\",\"response\":{\"output\":[{\"type\":\"message\",\"content\":[{\"type\":\"output_text\",\"text\":\"Hi\"}]}]}}"
        );
        let (a, rest) = wire.split_at(40);
        let (b, c) = rest.split_at(90);
        let items: Vec<_> = openai_event_stream(EngineId::new("openai"), bytes_of(&[a, b, c]))
            .map(|item| item.expect("item"))
            .collect()
            .await;

        assert_eq!(
            items[..2],
            [
                ChannelItem::Primary(PrimaryChunk::new(REASONING_STAGE, "plan")),
                ChannelItem::Primary(PrimaryChunk::new(MODEL_STAGE, "Hi")),
            ]
        );
        assert!(
            matches!(&items[2], ChannelItem::Secondary(update) if update.latest_text().as_deref() == Some("Hi"))
        );
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn failed_event_surfaces_as_stream_error() {
        let wire = "data: {\"type\":\"response.output_text.delta\",\"delta\":\"Par\"}\n\ndata: {\"type\":\"response.failed\",\"response\":{\"error\":{\"message\":\"overloaded\"}}}\n\n";
        let mut stream = Box::pin(openai_event_stream(
            EngineId::new("openai"),
            bytes_of(&[wire]),
        ));
        assert!(matches!(stream.next().await, Some(Ok(ChannelItem::Primary(_)))));
        assert!(matches!(
            stream.next().await,
            Some(Err(EngineError::Provider { .. }))
        ));
    }

    #[tokio::test]
    async fn slow_stream_outlives_connect_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            while !String::from_utf8_lossy(&request).contains("\"stream\":true") {
                let read = socket.read(&mut chunk).await.expect("read");
                assert!(read > 0, "connection closed mid-request");
                request.extend_from_slice(&chunk[..read]);
            }
            let delta = |text: &str| {
                format!("data: {{\"type\":\"response.output_text.delta\",\"delta\":\"{text}\"}}\n\n")
            };
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
            socket.write_all(head.as_bytes()).await.expect("head");
            socket.write_all(delta("Hel").as_bytes()).await.expect("first");
            socket.flush().await.expect("flush");
            tokio::time::sleep(Duration::from_millis(300)).await;
            socket.write_all(delta("lo").as_bytes()).await.expect("second");
            let _ = socket.shutdown().await;
        });

        let engine = OpenAiEngine::new(
            OpenAiEngineConfig::new("k")
                .base_url(format!("http://{addr}"))
                .connect_timeout(Duration::from_millis(100)),
        )
        .expect("engine");
        let stream = engine
            .invoke(EngineRequest {
                request_id: uuid::Uuid::new_v4(),
                messages: vec![ChatMessage::user("hi")],
            })
            .await
            .expect("invoke");
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2, "stream cut short: {items:?}");
        assert_eq!(
            items.into_iter().map(|item| item.expect("item")).collect::<Vec<_>>(),
            vec![
                ChannelItem::Primary(PrimaryChunk::new(MODEL_STAGE, "Hel")),
                ChannelItem::Primary(PrimaryChunk::new(MODEL_STAGE, "lo")),
            ]
        );
    }

    #[tokio::test]
    async fn env_gated_smoke_stream_if_key_present() {
        if std::env::var("OPENAI_API_KEY")
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            eprintln!("skipping OpenAI smoke test (OPENAI_API_KEY missing)");
            return;
        }

        let engine = OpenAiEngine::from_env().expect("engine");
        let stream = engine
            .invoke(EngineRequest {
                request_id: uuid::Uuid::new_v4(),
                messages: vec![ChatMessage::user("Return exactly the word: ok")],
            })
            .await
            .expect("invoke");
        let items: Vec<_> = stream.collect().await;
        assert!(items.iter().all(Result::is_ok), "OpenAI smoke failed: {items:?}");
    }
}
