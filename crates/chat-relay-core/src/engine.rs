//! Contract for the model-invocation engine.
//!
//! An engine turns an ordered message list into two progress channels:
//!
//! - **primary**: fine-grained content fragments tagged with the stage that
//!   produced them;
//! - **secondary**: coarse stage-keyed snapshots of accumulated output, used
//!   only as a fallback source.
//!
//! Both channels are consumed as one ordered stream of [`ChannelItem`]s.

use std::fmt;
use std::pin::Pin;

use futures::{Stream, StreamExt as _};

use crate::content::{ChatMessage, MessageContent};
use crate::errors::EngineError;

/// Stable identifier for an engine implementation (for example `openai`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EngineId(pub String);

impl EngineId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EngineId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EngineId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// One generation request handed to an engine.
#[derive(Clone, Debug)]
pub struct EngineRequest {
    pub request_id: uuid::Uuid,
    pub messages: Vec<ChatMessage>,
}

/// Fragment from the primary channel.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimaryChunk {
    /// Stage that produced the fragment.
    pub stage: String,
    pub content: MessageContent,
}

impl PrimaryChunk {
    pub fn new(stage: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            stage: stage.into(),
            content: content.into(),
        }
    }
}

/// Accumulated output of one stage at the time of an update.
#[derive(Clone, Debug, PartialEq)]
pub struct StageSnapshot {
    pub stage: String,
    pub messages: Vec<MessageContent>,
}

/// Item from the secondary channel: snapshots keyed by stage, in stage order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StageUpdate {
    pub stages: Vec<StageSnapshot>,
}

impl StageUpdate {
    /// Update carrying a single message for a single stage.
    pub fn single(stage: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            stages: vec![StageSnapshot {
                stage: stage.into(),
                messages: vec![content.into()],
            }],
        }
    }

    /// Latest non-empty text found in the update, scanning stages and their
    /// messages in order.
    pub fn latest_text(&self) -> Option<String> {
        self.stages
            .iter()
            .flat_map(|snapshot| snapshot.messages.iter())
            .rev()
            .map(MessageContent::text)
            .find(|text| !text.is_empty())
    }
}

/// One item of the merged engine output, tagged by channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelItem {
    Primary(PrimaryChunk),
    Secondary(StageUpdate),
}

/// Merged, ordered engine output for one generation.
pub type EngineStream =
    Pin<Box<dyn Stream<Item = Result<ChannelItem, EngineError>> + Send + 'static>>;

/// Merges separately produced primary and secondary channels into a single
/// interleaving in arrival order. Ends once both channels end.
pub fn merge_channels<P, S>(primary: P, secondary: S) -> EngineStream
where
    P: Stream<Item = Result<PrimaryChunk, EngineError>> + Send + 'static,
    S: Stream<Item = Result<StageUpdate, EngineError>> + Send + 'static,
{
    Box::pin(futures::stream::select(
        primary.map(|item| item.map(ChannelItem::Primary)),
        secondary.map(|item| item.map(ChannelItem::Secondary)),
    ))
}

/// Model-invocation engine used by the generation orchestrator.
#[async_trait::async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> EngineId;

    /// Starts one generation.
    ///
    /// Errors returned here happen before any output exists; errors yielded by
    /// the stream happen mid-generation.
    async fn invoke(&self, request: EngineRequest) -> Result<EngineStream, EngineError>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod scripted {
    //! Deterministic engine for tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use futures::{StreamExt as _, stream};

    use super::*;

    /// Engine that replays a fixed list of channel items.
    #[derive(Clone)]
    pub struct ScriptedEngine {
        items: Vec<Result<ChannelItem, EngineError>>,
        invoke_error: Option<EngineError>,
        hold_open: bool,
        calls: Arc<AtomicUsize>,
        last_messages: Arc<Mutex<Option<Vec<ChatMessage>>>>,
    }

    impl ScriptedEngine {
        pub fn new(items: Vec<Result<ChannelItem, EngineError>>) -> Self {
            Self {
                items,
                invoke_error: None,
                hold_open: false,
                calls: Arc::new(AtomicUsize::new(0)),
                last_messages: Arc::new(Mutex::new(None)),
            }
        }

        /// Engine whose primary channel yields `tokens` from `stage`.
        pub fn tokens(stage: &str, tokens: &[&str]) -> Self {
            Self::new(
                tokens
                    .iter()
                    .map(|token| Ok(ChannelItem::Primary(PrimaryChunk::new(stage, *token))))
                    .collect(),
            )
        }

        /// Engine whose `invoke` fails with `error`.
        pub fn failing(error: EngineError) -> Self {
            Self {
                invoke_error: Some(error),
                ..Self::new(Vec::new())
            }
        }

        /// Keeps the stream open after the scripted items instead of ending it.
        pub fn hold_open(mut self) -> Self {
            self.hold_open = true;
            self
        }

        /// Number of `invoke` calls so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Messages passed to the most recent `invoke`.
        pub fn last_messages(&self) -> Option<Vec<ChatMessage>> {
            self.last_messages
                .lock()
                .map(|guard| guard.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl GenerationEngine for ScriptedEngine {
        fn id(&self) -> EngineId {
            EngineId::new("scripted")
        }

        async fn invoke(&self, request: EngineRequest) -> Result<EngineStream, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut guard) = self.last_messages.lock() {
                *guard = Some(request.messages);
            }
            if let Some(err) = &self.invoke_error {
                return Err(err.clone());
            }
            let items = stream::iter(self.items.clone());
            if self.hold_open {
                Ok(Box::pin(items.chain(stream::pending())))
            } else {
                Ok(Box::pin(items))
            }
        }
    }
}
