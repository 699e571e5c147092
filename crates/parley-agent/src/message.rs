//! Canonical message model.
//!
//! Every provider integration translates its wire format into these types,
//! so the rest of the runtime never sees provider-specific shapes.  A
//! [`Message`] is one conversation turn made of ordered [`Part`]s.  Runtime
//! operations never mutate a message in place: accumulation, consolidation
//! and orchestration all build new messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open, string-keyed metadata attached to messages and streamed units.
pub type Metadata = serde_json::Map<String, Value>;

/// JSON object used for tool-call arguments.
pub type Arguments = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.  Tool results are carried in user turns.
    User,
    /// Output from the language model.
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Model => "model",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Tool parts
// ---------------------------------------------------------------------------

/// A tool invocation requested by the model.
///
/// While streaming, several fragments with the same `call_id` describe the
/// same logical call at different stages of completeness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identity used to merge fragments and pair the call with its result.
    pub call_id: String,

    /// Name of the tool to invoke.  May be empty in a late fragment.
    pub tool_name: String,

    /// Arguments as a JSON object.  May be empty in an early fragment.
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Arguments,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Create a tool call from a JSON value, keeping it only if it is an
    /// object.  Anything else yields empty arguments.
    pub fn from_value(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Arguments::new(),
        };
        Self::new(call_id, tool_name, arguments)
    }
}

/// The outcome of a tool call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The [`ToolCall::call_id`] this result answers.
    pub call_id: String,

    /// Name of the tool that produced the result.
    pub tool_name: String,

    /// Result payload.
    pub result: Value,
}

impl ToolResult {
    /// Create a tool result.
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            result,
        }
    }

    /// The payload as text: strings verbatim, anything else JSON-encoded.
    pub fn result_text(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Either side of a tool interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolPart {
    /// The model asks for a tool to run.
    Call(ToolCall),
    /// The runtime answers a call.
    Result(ToolResult),
}

impl ToolPart {
    /// The cross-reference key shared by a call and its result.
    pub fn call_id(&self) -> &str {
        match self {
            Self::Call(call) => &call.call_id,
            Self::Result(result) => &result.call_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// A single content fragment within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text(String),

    /// Inline binary content.
    Data {
        /// Raw bytes, base64-encoded on the wire.
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        /// MIME type of the payload (e.g. `image/png`).
        mime_type: String,
        /// Optional file name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// A reference to external content.
    Link {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Reasoning text the model exposes alongside its answer.
    Thinking(String),

    /// A tool call or tool result.
    Tool(ToolPart),
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a thinking part.
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking(text.into())
    }

    /// Create a tool-call part.
    pub fn call(call: ToolCall) -> Self {
        Self::Tool(ToolPart::Call(call))
    }

    /// Create a tool-result part.
    pub fn result(result: ToolResult) -> Self {
        Self::Tool(ToolPart::Result(result))
    }

    /// Returns the tool call if this part is one.
    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Self::Tool(ToolPart::Call(call)) => Some(call),
            _ => None,
        }
    }

    /// Returns the tool result if this part is one.
    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match self {
            Self::Tool(ToolPart::Result(result)) => Some(result),
            _ => None,
        }
    }

    /// Whether this part is reasoning text.
    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::Thinking(_))
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// Ordered content fragments.
    #[serde(default)]
    pub parts: Vec<Part>,

    /// Provider or runtime annotations.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Message {
    /// Create a message with the given role and parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            metadata: Metadata::new(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Create a model message from parts.
    pub fn model(parts: Vec<Part>) -> Self {
        Self::new(Role::Model, parts)
    }

    /// Create a model message holding a single text part.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::model(vec![Part::text(text)])
    }

    /// Create an empty model message (the seed for accumulation).
    pub fn empty_model() -> Self {
        Self::model(Vec::new())
    }

    /// Create the synthetic user turn that carries tool results back to the
    /// model.
    pub fn tool_results(results: impl IntoIterator<Item = ToolResult>) -> Self {
        Self::new(Role::User, results.into_iter().map(Part::result).collect())
    }

    /// Return a copy with one metadata entry added or replaced.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Concatenated text of all [`Part::Text`] parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text of all [`Part::Thinking`] parts.
    pub fn thinking(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Thinking(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All tool calls in part order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts.iter().filter_map(Part::as_tool_call).collect()
    }

    /// All tool results in part order.
    pub fn tool_results_iter(&self) -> impl Iterator<Item = &ToolResult> {
        self.parts.iter().filter_map(Part::as_tool_result)
    }

    /// Whether the message requests at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| p.as_tool_call().is_some())
    }

    /// Whether the message carries no parts at all.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Whether the message is a streaming-only reasoning artifact: it has
    /// parts and every one of them is [`Part::Thinking`].
    pub fn is_thinking_only(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(Part::is_thinking)
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::model_text("m").role, Role::Model);
        assert!(Message::empty_model().is_empty());
    }

    #[test]
    fn text_and_thinking_concatenate_in_order() {
        let msg = Message::model(vec![
            Part::text("Hel"),
            Part::thinking("let me "),
            Part::text("lo"),
            Part::thinking("think"),
        ]);
        assert_eq!(msg.text(), "Hello");
        assert_eq!(msg.thinking(), "let me think");
    }

    #[test]
    fn tool_results_turn_is_user_role() {
        let msg = Message::tool_results(vec![ToolResult::new("c1", "echo", json!("hi"))]);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.tool_results_iter().count(), 1);
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn thinking_only_detection() {
        assert!(Message::model(vec![Part::thinking("hmm")]).is_thinking_only());
        assert!(!Message::empty_model().is_thinking_only());
        assert!(!Message::model(vec![Part::thinking("hmm"), Part::text("ok")]).is_thinking_only());
    }

    #[test]
    fn from_value_drops_non_object_arguments() {
        let call = ToolCall::from_value("c1", "echo", json!([1, 2]));
        assert!(call.arguments.is_empty());

        let call = ToolCall::from_value("c2", "echo", json!({"msg": "hi"}));
        assert_eq!(call.arguments["msg"], "hi");
    }

    #[test]
    fn data_part_bytes_are_base64_on_the_wire() {
        let msg = Message::user("see attached").with_metadata("source", json!("test"));
        let msg = Message {
            parts: vec![Part::Data {
                bytes: vec![0xde, 0xad, 0xbe, 0xef],
                mime_type: "application/octet-stream".into(),
                name: Some("blob.bin".into()),
            }],
            ..msg
        };

        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded["parts"][0]["type"], "data");
        assert_eq!(encoded["parts"][0]["content"]["bytes"], "3q2+7w==");

        let decoded: Message = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn tool_part_serializes_with_kind_tag() {
        let part = Part::call(ToolCall::from_value("c1", "search", json!({"q": "rust"})));
        let encoded = serde_json::to_value(&part).unwrap();
        assert_eq!(encoded["type"], "tool");
        assert_eq!(encoded["content"]["kind"], "call");
        assert_eq!(encoded["content"]["call_id"], "c1");
    }

    #[test]
    fn result_text_passes_strings_through() {
        let text = ToolResult::new("c1", "t", json!("plain"));
        assert_eq!(text.result_text(), "plain");
        let obj = ToolResult::new("c1", "t", json!({"a": 1}));
        assert_eq!(obj.result_text(), r#"{"a":1}"#);
    }
}
