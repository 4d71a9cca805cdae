use serde_json::{Map, Value};

/// Speaker of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Returns the wire name of the role (`user`, `assistant`, `system`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One role-tagged turn of a conversation, as submitted by the caller.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Content produced by the model-invocation engine.
///
/// Engines report content either as a plain string or as an ordered list of
/// heterogeneous parts (text segments, tool-call segments, ...). The shape is
/// resolved once at the boundary and flattened with [`MessageContent::text`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Ordered list of content parts.
    Parts(Vec<ContentPart>),
    /// Any other JSON shape. Contributes no text.
    Other(Value),
}

impl MessageContent {
    /// Concatenates the text carried by this content in order.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts.iter().map(ContentPart::text).collect(),
            Self::Other(_) => String::new(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One element of a multi-part [`MessageContent`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    /// Bare string segment.
    Text(String),
    /// Structured segment; contributes its `text` field when that is a string.
    Object(Map<String, Value>),
    /// Anything else (numbers, nested arrays, null).
    Other(Value),
}

impl ContentPart {
    /// Returns the text this part contributes, or `""`.
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Object(map) => map.get("text").and_then(Value::as_str).unwrap_or(""),
            Self::Other(_) => "",
        }
    }
}
