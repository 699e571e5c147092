//! A provider that replays canned responses.
//!
//! [`ScriptedProvider`] answers each `send_stream` call with the next
//! [`ScriptedTurn`] from its queue and records what it was sent.  It backs
//! the `parley replay` command and the crate's orchestration tests, where it
//! stands in for a real wire client.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::llm::provider::{ChatProvider, ChunkStream};
use crate::llm::types::{
    ChatOptions, FinishReason, ModelChunk, ProviderCapabilities, ToolDefinition, Usage,
};
use crate::message::{Message, ToolCall};

// ---------------------------------------------------------------------------
// Script entries
// ---------------------------------------------------------------------------

/// One canned model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedTurn {
    /// Chunks streamed back, in order.
    #[serde(default)]
    pub chunks: Vec<ModelChunk>,

    /// Fail the request itself with this reason instead of streaming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,

    /// Yield a stream error with this reason after the chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_error: Option<String>,

    /// Delay before each chunk, in milliseconds.
    #[serde(default)]
    pub chunk_delay_ms: u64,
}

impl ScriptedTurn {
    /// Stream the given chunks.
    pub fn new(chunks: Vec<ModelChunk>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// A plain text answer, streamed as one chunk per fragment and finished
    /// with [`FinishReason::Stop`].
    pub fn text<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chunks: Vec<ModelChunk> = fragments.into_iter().map(ModelChunk::text).collect();
        chunks.push(
            ModelChunk::empty()
                .finished(FinishReason::Stop)
                .with_usage(Usage::new(10, 5)),
        );
        Self::new(chunks)
    }

    /// A turn requesting the given tool calls, finished with
    /// [`FinishReason::ToolCalls`].
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        let mut chunks: Vec<ModelChunk> = calls.into_iter().map(ModelChunk::call).collect();
        chunks.push(ModelChunk::empty().finished(FinishReason::ToolCalls));
        Self::new(chunks)
    }

    /// A turn with no content at all.
    pub fn empty() -> Self {
        Self::new(vec![ModelChunk::empty().finished(FinishReason::Stop)])
    }

    /// A request that fails before streaming.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Builder: yield a stream error after the chunks.
    pub fn then_error(mut self, reason: impl Into<String>) -> Self {
        self.stream_error = Some(reason.into());
        self
    }

    /// Builder: wait before every chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// What the provider was asked for on one invocation.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The history sent.
    pub history: Vec<Message>,
    /// Names of the tools offered.
    pub tools: Vec<String>,
    /// The options sent.
    pub options: ChatOptions,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Replays a queue of [`ScriptedTurn`]s, one per invocation.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    capabilities: ProviderCapabilities,
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    /// Create a provider that replays `turns` in order.
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            name: "scripted".into(),
            capabilities: ProviderCapabilities::default(),
            turns: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Parse a script: a JSON array of [`ScriptedTurn`]s.
    pub fn from_json(script: &str) -> Result<Self> {
        let turns: Vec<ScriptedTurn> = serde_json::from_str(script)?;
        Ok(Self::new(turns))
    }

    /// Builder: advertise the given capabilities.
    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// How many times the model was invoked.
    pub fn invocation_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Turns not yet replayed.
    pub fn remaining(&self) -> usize {
        lock(&self.turns).len()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn send_stream(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<ChunkStream> {
        lock(&self.requests).push(RecordedRequest {
            history: history.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
            options: options.clone(),
        });

        let turn = lock(&self.turns)
            .pop_front()
            .ok_or_else(|| AgentError::Provider {
                reason: "scripted provider has no turns left".into(),
            })?;

        if let Some(reason) = turn.fail {
            return Err(AgentError::Provider { reason });
        }

        tracing::trace!(chunks = turn.chunks.len(), "replaying scripted turn");

        let delay = Duration::from_millis(turn.chunk_delay_ms);
        let tail = turn.stream_error.map(|reason| Err(AgentError::Stream { reason }));
        let stream = futures::stream::iter(turn.chunks.into_iter().map(Ok))
            .chain(futures::stream::iter(tail));

        if delay.is_zero() {
            Ok(stream.boxed())
        } else {
            Ok(stream
                .then(move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                })
                .boxed())
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
