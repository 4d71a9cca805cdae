use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt as _};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

use crate::content::ChatMessage;
use crate::engine::{ChannelItem, EngineId, EngineRequest, EngineStream, GenerationEngine};
use crate::errors::GenerationError;
use crate::stream::StreamEvent;

/// Message carried by the in-stream `Error` event. Provider details stay in
/// the server logs.
pub const GENERATION_FAILED_MESSAGE: &str = "The assistant failed to generate a response.";

/// Stage whose primary-channel fragments form the visible answer by default.
pub const DEFAULT_ANSWER_STAGE: &str = "model";

/// Per-generation behavior options.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    /// Only primary fragments tagged with this stage become tokens.
    pub answer_stage: String,
    /// Bounded event buffer between the generation task and the emitter.
    pub buffer_capacity: usize,
    /// Optional limit on the whole generation; elapsing ends the stream with
    /// an `Error` event.
    pub timeout: Option<Duration>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            answer_stage: DEFAULT_ANSWER_STAGE.to_string(),
            buffer_capacity: 128,
            timeout: None,
        }
    }
}

impl GenerationOptions {
    pub fn answer_stage(mut self, stage: impl Into<String>) -> Self {
        self.answer_stage = stage.into();
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// How a generation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// `Done` was emitted.
    Completed,
    /// `Error` was emitted.
    Failed,
    /// The consumer went away before the terminal event.
    Disconnected,
}

/// Bookkeeping reported when a generation task ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationSummary {
    pub request_id: uuid::Uuid,
    /// `Token` events emitted, including a fallback token.
    pub tokens: u64,
    /// Characters of text accepted from the primary channel.
    pub streamed_chars: usize,
    pub used_fallback: bool,
    pub outcome: GenerationOutcome,
}

/// Rejects message lists the engine must never see.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), GenerationError> {
    if messages.is_empty() {
        return Err(GenerationError::Validation(
            "at least one message is required".into(),
        ));
    }
    Ok(())
}

/// Validates input, invokes the engine and spawns the task that turns its
/// channels into [`StreamEvent`]s.
///
/// Failures returned here happen before any event exists; once this returns
/// `Ok`, every outcome is reported in-stream.
pub async fn start_generation(
    engine: Arc<dyn GenerationEngine>,
    messages: Vec<ChatMessage>,
    options: GenerationOptions,
) -> Result<GenerationStream, GenerationError> {
    validate_messages(&messages)?;
    if options.buffer_capacity == 0 {
        return Err(GenerationError::InvalidOptions(
            "buffer_capacity must be greater than 0".into(),
        ));
    }

    let request_id = uuid::Uuid::new_v4();
    let engine_id = engine.id();
    debug!(request_id = %request_id, engine = %engine_id, messages = messages.len(), "invoking engine");
    let channels = engine
        .invoke(EngineRequest {
            request_id,
            messages,
        })
        .await?;

    let (tx, rx) = mpsc::channel(options.buffer_capacity);
    let (summary_tx, summary_rx) = oneshot::channel();
    tokio::spawn(async move {
        let summary = drive_generation(request_id, channels, &options, &tx).await;
        info!(
            request_id = %summary.request_id,
            tokens = summary.tokens,
            streamed_chars = summary.streamed_chars,
            used_fallback = summary.used_fallback,
            outcome = ?summary.outcome,
            "generation finished"
        );
        let _ = summary_tx.send(summary);
    });

    Ok(GenerationStream {
        request_id,
        engine: engine_id,
        rx,
        summary_rx,
        saw_terminal: false,
    })
}

/// Consumes the merged engine channels and emits the event sequence.
///
/// Primary fragments from the answer stage are emitted as soon as they
/// arrive; secondary updates only refresh the fallback candidate. When the
/// primary channel produced nothing, the last fallback candidate is emitted
/// as a single token before `Done`. Any engine error ends the stream with one
/// generic `Error` event and no `Done`.
pub async fn drive_generation(
    request_id: uuid::Uuid,
    mut channels: EngineStream,
    options: &GenerationOptions,
    tx: &mpsc::Sender<StreamEvent>,
) -> GenerationSummary {
    let mut acc = Accumulator::new(request_id);
    let deadline = options
        .timeout
        .map(|timeout| tokio::time::Instant::now() + timeout);

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, channels.next()).await {
                Ok(next) => next,
                Err(_) => {
                    error!(request_id = %request_id, "generation timed out");
                    return acc.fail(tx).await;
                }
            },
            None => channels.next().await,
        };

        match next {
            Some(Ok(ChannelItem::Primary(chunk))) => {
                if chunk.stage != options.answer_stage {
                    trace!(request_id = %request_id, stage = %chunk.stage, "ignoring fragment from non-answer stage");
                    continue;
                }
                let text = chunk.content.text();
                if text.is_empty() {
                    continue;
                }
                acc.streamed.push_str(&text);
                if !acc.emit(tx, StreamEvent::Token { content: text }).await {
                    return acc.summary(GenerationOutcome::Disconnected);
                }
            }
            Some(Ok(ChannelItem::Secondary(update))) => {
                if let Some(text) = update.latest_text() {
                    trace!(request_id = %request_id, chars = text.len(), "fallback candidate updated");
                    acc.fallback = Some(text);
                }
            }
            Some(Err(err)) => {
                error!(request_id = %request_id, error = %err, "generation failed");
                return acc.fail(tx).await;
            }
            None => break,
        }
    }

    if acc.streamed.is_empty()
        && let Some(fallback) = acc.fallback.take()
    {
        debug!(request_id = %request_id, "primary channel was empty; emitting fallback");
        acc.used_fallback = true;
        if !acc.emit(tx, StreamEvent::Token { content: fallback }).await {
            return acc.summary(GenerationOutcome::Disconnected);
        }
    }

    if acc.emit(tx, StreamEvent::Done).await {
        acc.summary(GenerationOutcome::Completed)
    } else {
        acc.summary(GenerationOutcome::Disconnected)
    }
}

struct Accumulator {
    request_id: uuid::Uuid,
    streamed: String,
    fallback: Option<String>,
    tokens: u64,
    used_fallback: bool,
}

impl Accumulator {
    fn new(request_id: uuid::Uuid) -> Self {
        Self {
            request_id,
            streamed: String::new(),
            fallback: None,
            tokens: 0,
            used_fallback: false,
        }
    }

    async fn emit(&mut self, tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
        if matches!(event, StreamEvent::Token { .. }) {
            self.tokens = self.tokens.saturating_add(1);
        }
        let sent = tx.send(event).await.is_ok();
        if !sent {
            debug!(request_id = %self.request_id, "event receiver dropped; stopping generation");
        }
        sent
    }

    async fn fail(mut self, tx: &mpsc::Sender<StreamEvent>) -> GenerationSummary {
        if self.emit(tx, StreamEvent::error(GENERATION_FAILED_MESSAGE)).await {
            self.summary(GenerationOutcome::Failed)
        } else {
            self.summary(GenerationOutcome::Disconnected)
        }
    }

    fn summary(&self, outcome: GenerationOutcome) -> GenerationSummary {
        GenerationSummary {
            request_id: self.request_id,
            tokens: self.tokens,
            streamed_chars: self.streamed.chars().count(),
            used_fallback: self.used_fallback,
            outcome,
        }
    }
}

/// Handle returned by [`start_generation`].
///
/// Use `next_event()` to consume events one by one, or `into_event_stream()`
/// to hand them to a response body. Dropping the handle stops the generation
/// task and releases the engine stream.
pub struct GenerationStream {
    request_id: uuid::Uuid,
    engine: EngineId,
    rx: mpsc::Receiver<StreamEvent>,
    summary_rx: oneshot::Receiver<GenerationSummary>,
    saw_terminal: bool,
}

impl GenerationStream {
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    pub fn engine(&self) -> &EngineId {
        &self.engine
    }

    /// Returns the next event, or `None` once the terminal event has been
    /// returned.
    ///
    /// If the generation task ends without a terminal event, a generic
    /// `Error` is returned in its place.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.saw_terminal {
            return None;
        }
        let event = self
            .rx
            .recv()
            .await
            .unwrap_or_else(|| StreamEvent::error(GENERATION_FAILED_MESSAGE));
        if event.is_terminal() {
            self.saw_terminal = true;
        }
        Some(event)
    }

    /// Drains remaining events and returns the task summary.
    pub async fn finish(mut self) -> Option<GenerationSummary> {
        while self.next_event().await.is_some() {}
        self.summary_rx.await.ok()
    }

    /// Converts the handle into an event stream that ends right after the
    /// terminal event.
    pub fn into_event_stream(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        futures::stream::unfold(self, |mut generation| async move {
            generation
                .next_event()
                .await
                .map(|event| (event, generation))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedEngine;
    use crate::engine::{PrimaryChunk, StageUpdate};
    use crate::errors::EngineError;
    use futures::StreamExt as _;

    fn primary(stage: &str, text: &str) -> Result<ChannelItem, EngineError> {
        Ok(ChannelItem::Primary(PrimaryChunk::new(stage, text)))
    }

    fn secondary(stage: &str, text: &str) -> Result<ChannelItem, EngineError> {
        Ok(ChannelItem::Secondary(StageUpdate::single(stage, text)))
    }

    async fn run(engine: ScriptedEngine) -> (Vec<StreamEvent>, GenerationSummary) {
        let mut generation = start_generation(
            Arc::new(engine),
            vec![ChatMessage::user("hi")],
            GenerationOptions::default(),
        )
        .await
        .expect("start");
        let mut events = Vec::new();
        while let Some(event) = generation.next_event().await {
            events.push(event);
        }
        let summary = generation.finish().await.expect("summary");
        (events, summary)
    }

    #[tokio::test]
    async fn primary_tokens_stream_in_order_then_done() {
        let (events, summary) = run(ScriptedEngine::tokens("model", &["Hel", "lo"])).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::token("Hel"),
                StreamEvent::token("lo"),
                StreamEvent::Done
            ]
        );
        assert_eq!(summary.tokens, 2);
        assert_eq!(summary.streamed_chars, 5);
        assert_eq!(summary.outcome, GenerationOutcome::Completed);
    }

    #[tokio::test]
    async fn other_stages_and_empty_fragments_are_ignored() {
        let (events, _) = run(ScriptedEngine::new(vec![
            primary("reasoning", "thinking..."),
            primary("model", ""),
            primary("model", "answer"),
            primary("router", "route=qa"),
        ]))
        .await;
        assert_eq!(events, vec![StreamEvent::token("answer"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn part_list_fragments_are_normalized() {
        let parts = serde_json::from_value(serde_json::json!([
            {"type": "text", "text": "a"},
            {"type": "tool_call", "name": "search"},
            "b"
        ]))
        .expect("parts");
        let (events, _) = run(ScriptedEngine::new(vec![Ok(ChannelItem::Primary(
            PrimaryChunk {
                stage: "model".into(),
                content: parts,
            },
        ))]))
        .await;
        assert_eq!(events, vec![StreamEvent::token("ab"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn fallback_is_emitted_once_when_primary_is_empty() {
        let (events, summary) = run(ScriptedEngine::new(vec![
            secondary("model", "first draft"),
            primary("reasoning", "hidden"),
            secondary("model", "final answer"),
            secondary("model", ""),
        ]))
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::token("final answer"), StreamEvent::Done]
        );
        assert!(summary.used_fallback);
        assert_eq!(summary.tokens, 1);
    }

    #[tokio::test]
    async fn fallback_is_ignored_when_tokens_were_streamed() {
        let (events, summary) = run(ScriptedEngine::new(vec![
            primary("model", "streamed"),
            secondary("model", "snapshot"),
        ]))
        .await;
        assert_eq!(events, vec![StreamEvent::token("streamed"), StreamEvent::Done]);
        assert!(!summary.used_fallback);
    }

    #[tokio::test]
    async fn nothing_produced_yields_only_done() {
        let (events, _) = run(ScriptedEngine::new(vec![])).await;
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn mid_stream_error_becomes_generic_error_without_done() {
        let (events, summary) = run(ScriptedEngine::new(vec![
            primary("model", "Par"),
            Err(EngineError::provider("scripted", "upstream 502: secret detail", Some(502))),
            primary("model", "never"),
        ]))
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::token("Par"),
                StreamEvent::error(GENERATION_FAILED_MESSAGE)
            ]
        );
        assert_eq!(summary.outcome, GenerationOutcome::Failed);
    }

    #[tokio::test]
    async fn empty_message_list_is_rejected_before_invoking() {
        let engine = ScriptedEngine::tokens("model", &["x"]);
        let result = start_generation(
            Arc::new(engine.clone()),
            Vec::new(),
            GenerationOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(GenerationError::Validation(msg)) if msg.contains("at least one")));
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn zero_buffer_capacity_is_an_options_error_not_a_validation_error() {
        let engine = ScriptedEngine::tokens("model", &["x"]);
        let result = start_generation(
            Arc::new(engine.clone()),
            vec![ChatMessage::user("hi")],
            GenerationOptions::default().buffer_capacity(0),
        )
        .await;
        assert!(matches!(result, Err(GenerationError::InvalidOptions(_))));
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn invoke_failure_is_returned_not_streamed() {
        let result = start_generation(
            Arc::new(ScriptedEngine::failing(EngineError::Config("no key".into()))),
            vec![ChatMessage::user("hi")],
            GenerationOptions::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(GenerationError::Engine(EngineError::Config(_)))
        ));
    }

    #[tokio::test]
    async fn timeout_ends_stream_with_error() {
        let mut generation = start_generation(
            Arc::new(ScriptedEngine::tokens("model", &["slow"]).hold_open()),
            vec![ChatMessage::user("hi")],
            GenerationOptions::default().timeout(Duration::from_millis(50)),
        )
        .await
        .expect("start");
        assert_eq!(generation.next_event().await, Some(StreamEvent::token("slow")));
        assert_eq!(
            generation.next_event().await,
            Some(StreamEvent::error(GENERATION_FAILED_MESSAGE))
        );
        assert_eq!(generation.next_event().await, None);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_task() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let engine = ScriptedEngine::tokens("model", &["a", "b"]).hold_open();
        let channels = engine
            .invoke(EngineRequest {
                request_id: uuid::Uuid::new_v4(),
                messages: vec![ChatMessage::user("hi")],
            })
            .await
            .expect("invoke");
        let summary = drive_generation(
            uuid::Uuid::new_v4(),
            channels,
            &GenerationOptions::default(),
            &tx,
        )
        .await;
        assert_eq!(summary.outcome, GenerationOutcome::Disconnected);
    }

    #[tokio::test]
    async fn event_stream_ends_after_terminal_event() {
        let generation = start_generation(
            Arc::new(ScriptedEngine::tokens("model", &["a"])),
            vec![ChatMessage::user("hi")],
            GenerationOptions::default(),
        )
        .await
        .expect("start");
        let events: Vec<_> = generation.into_event_stream().collect().await;
        assert_eq!(events, vec![StreamEvent::token("a"), StreamEvent::Done]);
    }
}
