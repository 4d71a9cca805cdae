use crate::codec::SseFrame;
use crate::content::MessageContent;
use crate::engine::{ChannelItem, EngineId, PrimaryChunk, StageSnapshot, StageUpdate};
use crate::errors::EngineError;

/// Stage tag for answer text.
pub const MODEL_STAGE: &str = "model";
/// Stage tag for reasoning summaries; never part of the visible answer.
pub const REASONING_STAGE: &str = "reasoning";

pub(crate) fn map_openai_frame(
    engine: &EngineId,
    frame: &SseFrame,
) -> Result<Vec<ChannelItem>, EngineError> {
    if frame.data.trim().is_empty() || frame.data.trim() == "[DONE]" {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(&frame.data).map_err(|e| {
        EngineError::transport(engine.clone(), format!("invalid SSE JSON frame: {e}"))
    })?;
    map_openai_json(engine, &value)
}

pub(crate) fn map_openai_json(
    engine: &EngineId,
    value: &serde_json::Value,
) -> Result<Vec<ChannelItem>, EngineError> {
    let Some(event_type) = value.get("type").and_then(|v| v.as_str()) else {
        return Ok(Vec::new());
    };
    match event_type {
        "response.output_text.delta" => Ok(delta_item(value, MODEL_STAGE)),
        "response.reasoning_summary_text.delta" => Ok(delta_item(value, REASONING_STAGE)),
        "response.completed" => {
            let response = value.get("response").unwrap_or(value);
            Ok(vec![ChannelItem::Secondary(completed_update(response))])
        }
        "response.error" | "response.failed" | "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .or_else(|| {
                    value
                        .get("response")
                        .and_then(|r| r.get("error"))
                        .and_then(|e| e.get("message"))
                        .and_then(|v| v.as_str())
                })
                .or_else(|| value.get("message").and_then(|v| v.as_str()))
                .unwrap_or("OpenAI stream error");
            Err(EngineError::provider(engine.clone(), message, None))
        }
        _ => Ok(Vec::new()),
    }
}

fn delta_item(value: &serde_json::Value, stage: &str) -> Vec<ChannelItem> {
    match value.get("delta").and_then(|v| v.as_str()) {
        Some(delta) => vec![ChannelItem::Primary(PrimaryChunk::new(stage, delta))],
        None => Vec::new(),
    }
}

/// Snapshot of the final response: one message per `message` output item,
/// carrying that item's raw content part list.
pub(crate) fn completed_update(response: &serde_json::Value) -> StageUpdate {
    let mut messages = Vec::new();
    if let Some(items) = response.get("output").and_then(|v| v.as_array()) {
        for item in items {
            if item.get("type").and_then(|v| v.as_str()) != Some("message") {
                continue;
            }
            if let Some(content) = item.get("content") {
                messages.push(
                    serde_json::from_value(content.clone())
                        .unwrap_or_else(|_| MessageContent::Other(content.clone())),
                );
            }
        }
    }
    if messages.is_empty()
        && let Some(text) = response.get("output_text").and_then(|v| v.as_str())
    {
        messages.push(MessageContent::Text(text.to_string()));
    }
    StageUpdate {
        stages: vec![StageSnapshot {
            stage: MODEL_STAGE.to_string(),
            messages,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameBuffer, parse_sse_fields};

    fn engine() -> EngineId {
        EngineId::new("openai")
    }

    #[test]
    fn frame_buffer_reassembles_split_openai_frames() {
        let mut buffer = FrameBuffer::default();
        let part1 =
            b"event: message\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"hel";
        let part2 = b"lo\"}\n\n";
        assert!(buffer.push_chunk(part1).is_empty());
        let frames = buffer.push_chunk(part2);
        assert_eq!(frames.len(), 1);
        let frame = parse_sse_fields(&frames[0]).expect("fields");
        let items = map_openai_frame(&engine(), &frame).expect("map");
        assert_eq!(
            items,
            vec![ChannelItem::Primary(PrimaryChunk::new(MODEL_STAGE, "hello"))]
        );
    }

    #[test]
    fn reasoning_deltas_are_tagged_with_reasoning_stage() {
        let value = serde_json::json!({"type": "response.reasoning_summary_text.delta", "delta": "hmm"});
        let items = map_openai_json(&engine(), &value).expect("map");
        assert!(matches!(&items[0], ChannelItem::Primary(chunk) if chunk.stage == REASONING_STAGE));
    }

    #[test]
    fn completed_becomes_stage_update_with_part_list() {
        let completed = serde_json::json!({
            "type": "response.completed",
            "response": {
                "status": "completed",
                "output": [
                    {"type": "reasoning", "summary": []},
                    {"type": "message", "content": [{"type": "output_text", "text": "Hi there"}]}
                ]
            }
        });
        let items = map_openai_json(&engine(), &completed).expect("map");
        let ChannelItem::Secondary(update) = &items[0] else {
            panic!("expected secondary item");
        };
        assert_eq!(update.stages[0].stage, MODEL_STAGE);
        assert_eq!(update.latest_text().as_deref(), Some("Hi there"));
    }

    #[test]
    fn completed_without_output_falls_back_to_output_text() {
        let completed = serde_json::json!({
            "type": "response.completed",
            "response": {"status": "completed", "output": [], "output_text": "plain"}
        });
        let items = map_openai_json(&engine(), &completed).expect("map");
        assert!(
            matches!(&items[0], ChannelItem::Secondary(update) if update.latest_text().as_deref() == Some("plain"))
        );
    }

    #[test]
    fn maps_response_failed_to_provider_error() {
        let failed = serde_json::json!({
            "type": "response.failed",
            "response": {"error": {"message": "quota exceeded"}}
        });
        let err = map_openai_json(&engine(), &failed).expect_err("should fail");
        assert_eq!(err.to_string(), "provider error (openai): quota exceeded");
    }

    #[test]
    fn done_marker_and_unknown_events_map_to_nothing() {
        let done = SseFrame {
            event: None,
            data: "[DONE]".into(),
        };
        assert!(map_openai_frame(&engine(), &done).expect("done").is_empty());
        let created = serde_json::json!({"type": "response.created"});
        assert!(map_openai_json(&engine(), &created).expect("created").is_empty());
    }

    #[test]
    fn invalid_json_is_transport_error() {
        let frame = SseFrame {
            event: None,
            data: "{nope".into(),
        };
        assert!(matches!(
            map_openai_frame(&engine(), &frame),
            Err(EngineError::Transport { .. })
        ));
    }
}
