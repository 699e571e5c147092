//! Folding a streamed exchange into one result.
//!
//! [`TurnAggregator`] consumes the [`StreamedUnit`]s of a run in arrival
//! order and produces the [`FinalResult`] returned by the blocking entry
//! points.  It is also what a UI would use to keep a running total while it
//! renders units live.

use crate::llm::types::{FinalResult, FinishReason, StreamedUnit, Usage};
use crate::message::{Message, Metadata};

/// Accumulates streamed units into a [`FinalResult`].
#[derive(Debug, Default)]
pub struct TurnAggregator {
    output: String,
    thinking: String,
    messages: Vec<Message>,
    metadata: Metadata,
    finish_reason: FinishReason,
    usage: Option<Usage>,
}

impl TurnAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one unit into the running result.
    ///
    /// Thinking-only turns are streaming artifacts and are dropped here so
    /// they never reach the final message list.
    pub fn add(&mut self, unit: &StreamedUnit) {
        if !unit.text.is_empty() {
            self.output.push_str(&unit.text);
        }
        if !unit.thinking.is_empty() {
            self.thinking.push_str(&unit.thinking);
        }

        for message in &unit.messages {
            if message.is_thinking_only() {
                tracing::debug!(
                    role = %message.role,
                    parts = message.parts.len(),
                    "dropping thinking-only turn from final history"
                );
                continue;
            }
            self.messages.push(message.clone());
        }

        for (key, value) in &unit.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }

        self.finish_reason = unit.finish_reason;
        if unit.usage.is_some() {
            self.usage = unit.usage;
        }
    }

    /// Text output collected so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Messages collected so far.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Produce the final result.
    pub fn build_final(self) -> FinalResult {
        FinalResult {
            output: self.output,
            thinking: (!self.thinking.is_empty()).then_some(self.thinking),
            messages: self.messages,
            finish_reason: self.finish_reason,
            metadata: self.metadata,
            usage: self.usage,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
