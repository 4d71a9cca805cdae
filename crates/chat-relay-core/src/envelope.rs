//! Outer encodings: the POST body sent to the relay and the typed result
//! handed back to callers of the client reader.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::Value;

use crate::content::ChatMessage;

/// Content type for base64-wrapped request bodies.
pub const ENCODED_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
/// Content type for plain JSON request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Request body of `POST /api/chat`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// How the request body is wrapped on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestEncoding {
    /// Base64 over the UTF-8 JSON body.
    #[default]
    Encoded,
    /// JSON as-is.
    PlainJson,
}

impl RequestEncoding {
    /// Picks the decoder for a request from its `Content-Type` header.
    ///
    /// Only `application/json` selects plain JSON; everything else, including
    /// a missing header, is treated as the encoded form.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let essence = content_type
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .unwrap_or_default();
        if essence.eq_ignore_ascii_case("application/json") {
            Self::PlainJson
        } else {
            Self::Encoded
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Encoded => ENCODED_CONTENT_TYPE,
            Self::PlainJson => JSON_CONTENT_TYPE,
        }
    }
}

/// Request decoding failures. Both are caller errors (HTTP 400).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid payload")]
    InvalidPayload,
    #[error("messages must be a non-empty list")]
    EmptyMessages,
}

/// Serializes a request body in the given encoding.
pub fn encode_request(
    request: &ChatRequest,
    encoding: RequestEncoding,
) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(request)?;
    Ok(match encoding {
        RequestEncoding::Encoded => BASE64_STANDARD.encode(json).into_bytes(),
        RequestEncoding::PlainJson => json,
    })
}

/// Decodes and shape-checks a request body.
pub fn decode_request(
    body: &[u8],
    encoding: RequestEncoding,
) -> Result<ChatRequest, EnvelopeError> {
    let json = match encoding {
        RequestEncoding::Encoded => BASE64_STANDARD
            .decode(body.trim_ascii())
            .map_err(|_| EnvelopeError::InvalidPayload)?,
        RequestEncoding::PlainJson => body.to_vec(),
    };
    let mut value: Value =
        serde_json::from_slice(&json).map_err(|_| EnvelopeError::InvalidPayload)?;
    if !value.is_object() {
        return Err(EnvelopeError::InvalidPayload);
    }
    let messages = match value.get_mut("messages").map(Value::take) {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(EnvelopeError::EmptyMessages),
    };
    let messages = messages
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<ChatMessage>, _>>()
        .map_err(|_| EnvelopeError::InvalidPayload)?;
    Ok(ChatRequest { messages })
}

/// Final value returned by the client reader.
///
/// `content` is everything accumulated before the outcome was decided, so a
/// partial answer can still be shown after an abort or failure.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StreamChatResult {
    Ok { content: String },
    Aborted { content: String },
    Error { content: String, message: String },
}

impl StreamChatResult {
    pub fn content(&self) -> &str {
        match self {
            Self::Ok { content } | Self::Aborted { content } | Self::Error { content, .. } => {
                content
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Error message for `Error` results.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::system("short answers"), ChatMessage::user("hi")],
        }
    }

    #[test]
    fn encoded_body_is_base64_json() {
        let body = encode_request(&request(), RequestEncoding::Encoded).expect("encode");
        let json = BASE64_STANDARD.decode(&body).expect("base64");
        let value: Value = serde_json::from_slice(&json).expect("json");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(
            decode_request(&body, RequestEncoding::Encoded).expect("decode"),
            request()
        );
    }

    #[test]
    fn plain_json_body_is_accepted() {
        let body = br#"{"messages":[{"role":"user","content":"hi"}]}"#;
        let decoded = decode_request(body, RequestEncoding::PlainJson).expect("decode");
        assert_eq!(decoded.messages, vec![ChatMessage::user("hi")]);
    }

    #[test]
    fn encoded_body_tolerates_surrounding_whitespace() {
        let mut body = encode_request(&request(), RequestEncoding::Encoded).expect("encode");
        body.push(b'\n');
        assert!(decode_request(&body, RequestEncoding::Encoded).is_ok());
    }

    #[test]
    fn malformed_bodies_are_invalid_payload() {
        assert_eq!(
            decode_request(b"@@@", RequestEncoding::Encoded),
            Err(EnvelopeError::InvalidPayload)
        );
        let not_json = BASE64_STANDARD.encode(b"{nope");
        assert_eq!(
            decode_request(not_json.as_bytes(), RequestEncoding::Encoded),
            Err(EnvelopeError::InvalidPayload)
        );
        assert_eq!(
            decode_request(b"[1,2]", RequestEncoding::PlainJson),
            Err(EnvelopeError::InvalidPayload)
        );
        let bad_role = br#"{"messages":[{"role":"robot","content":"x"}]}"#;
        assert_eq!(
            decode_request(bad_role, RequestEncoding::PlainJson),
            Err(EnvelopeError::InvalidPayload)
        );
    }

    #[test]
    fn empty_missing_or_non_list_messages_are_rejected() {
        let bodies: [&[u8]; 4] = [
            br#"{"messages":[]}"#,
            br#"{"messages":"hi"}"#,
            br#"{"messages":{"role":"user"}}"#,
            br#"{}"#,
        ];
        for body in bodies {
            assert_eq!(
                decode_request(body, RequestEncoding::PlainJson),
                Err(EnvelopeError::EmptyMessages),
                "body: {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn content_type_selects_encoding() {
        assert_eq!(
            RequestEncoding::from_content_type(Some("application/json; charset=utf-8")),
            RequestEncoding::PlainJson
        );
        assert_eq!(
            RequestEncoding::from_content_type(Some("Application/JSON")),
            RequestEncoding::PlainJson
        );
        assert_eq!(
            RequestEncoding::from_content_type(Some(ENCODED_CONTENT_TYPE)),
            RequestEncoding::Encoded
        );
        assert_eq!(RequestEncoding::from_content_type(None), RequestEncoding::Encoded);
    }

    #[test]
    fn result_accessors() {
        let result = StreamChatResult::Error {
            content: "Par".into(),
            message: "failed".into(),
        };
        assert_eq!(result.content(), "Par");
        assert_eq!(result.error_message(), Some("failed"));
        assert!(!result.is_ok());
        assert!(
            StreamChatResult::Ok {
                content: "x".into()
            }
            .is_ok()
        );
    }
}
