//! Types exchanged with language-model providers.
//!
//! These types sit on the provider boundary.  A [`ChatProvider`] yields one
//! [`ModelChunk`] per network event, and the orchestrator turns those into
//! [`StreamedUnit`]s that callers either render live or fold into a
//! [`FinalResult`].
//!
//! [`ChatProvider`]: super::provider::ChatProvider

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, Metadata, Part, ToolCall};

// ---------------------------------------------------------------------------
// Finish reason and usage
// ---------------------------------------------------------------------------

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Not reported yet (typical for intermediate chunks).
    #[default]
    Unspecified,
    /// Natural end of the turn.
    Stop,
    /// The token limit was reached.
    Length,
    /// The model wants tools to run before continuing.
    ToolCalls,
    /// Output was withheld by a safety filter.
    ContentFilter,
    /// Output was withheld for reciting training data.
    Recitation,
    /// The caller cancelled the run.
    Cancelled,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the input (prompt).
    #[serde(default)]
    pub input_tokens: u32,
    /// Number of tokens generated by the model.
    #[serde(default)]
    pub output_tokens: u32,
}

impl Usage {
    /// Create a usage record.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Input plus output tokens.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A tool definition exposed to the model so it knows what it may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's input parameters.
    pub input_schema: Value,
}

/// Per-request generation options forwarded to the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Model identifier; `None` lets the provider pick its default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate in one turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// JSON Schema the final answer must conform to (typed output).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// What a provider can do natively.  Drives orchestrator selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// The provider accepts an output schema and tools in the same request.
    #[serde(default)]
    pub typed_output_with_tools: bool,
}

// ---------------------------------------------------------------------------
// Provider chunks
// ---------------------------------------------------------------------------

/// One network event from a provider stream.
///
/// `output` is a partial model turn: text deltas are its text parts, reasoning
/// deltas its thinking parts, and tool-call fragments its call parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelChunk {
    /// The partial model turn carried by this event.
    pub output: Message,

    /// Finish reason, usually only set on the final chunk.
    #[serde(default)]
    pub finish_reason: FinishReason,

    /// Provider annotations (response id, model name, ...).
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,

    /// Token usage, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelChunk {
    /// Wrap a partial model turn.
    pub fn new(output: Message) -> Self {
        Self {
            output,
            finish_reason: FinishReason::Unspecified,
            metadata: Metadata::new(),
            usage: None,
        }
    }

    /// A chunk carrying one text delta.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Message::model(vec![Part::text(text)]))
    }

    /// A chunk carrying one reasoning delta.
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::new(Message::model(vec![Part::thinking(text)]))
    }

    /// A chunk carrying one tool-call fragment.
    pub fn call(call: ToolCall) -> Self {
        Self::new(Message::model(vec![Part::call(call)]))
    }

    /// A chunk with no content, typically the terminal one.
    pub fn empty() -> Self {
        Self::new(Message::empty_model())
    }

    /// Builder: set the finish reason.
    pub fn finished(mut self, reason: FinishReason) -> Self {
        self.finish_reason = reason;
        self
    }

    /// Builder: attach usage.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Builder: add one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// Orchestrator output
// ---------------------------------------------------------------------------

/// One unit of orchestrator output.
///
/// Emitted once per received chunk (carrying its text and thinking deltas)
/// and once per completed step (carrying the turns appended to history).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamedUnit {
    /// Text produced since the previous unit.
    #[serde(default)]
    pub text: String,

    /// Reasoning produced since the previous unit.
    #[serde(default)]
    pub thinking: String,

    /// Turns appended to the conversation history by this step.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Latest known finish reason.
    #[serde(default)]
    pub finish_reason: FinishReason,

    /// Metadata observed in this step.
    #[serde(default)]
    pub metadata: Metadata,

    /// Usage observed in this step, if any.
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl StreamedUnit {
    /// A unit carrying only history turns.
    pub fn with_messages(messages: Vec<Message>, finish_reason: FinishReason) -> Self {
        Self {
            messages,
            finish_reason,
            ..Self::default()
        }
    }
}

/// The folded result of a whole streamed exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    /// All text output, concatenated.
    pub output: String,

    /// All reasoning, concatenated; `None` when the model produced none.
    pub thinking: Option<String>,

    /// New history turns, with thinking-only artifacts removed.
    pub messages: Vec<Message>,

    /// The last finish reason seen.
    pub finish_reason: FinishReason,

    /// Metadata merged across the exchange, last write wins.
    pub metadata: Metadata,

    /// The last usage reported.
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finish_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(FinishReason::ToolCalls).unwrap(),
            json!("tool_calls")
        );
        assert_eq!(FinishReason::default(), FinishReason::Unspecified);
    }

    #[test]
    fn usage_total_saturates() {
        assert_eq!(Usage::new(10, 5).total_tokens(), 15);
        assert_eq!(Usage::new(u32::MAX, 1).total_tokens(), u32::MAX);
    }

    #[test]
    fn chunk_deserializes_with_defaults() {
        let chunk: ModelChunk = serde_json::from_value(json!({
            "output": {"role": "model", "parts": [{"type": "text", "content": "hi"}]}
        }))
        .unwrap();
        assert_eq!(chunk.finish_reason, FinishReason::Unspecified);
        assert!(chunk.usage.is_none());
        assert_eq!(chunk.output.text(), "hi");
    }
}
