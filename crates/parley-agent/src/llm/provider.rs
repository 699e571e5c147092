//! The provider boundary.
//!
//! Wire-protocol clients live outside this crate.  They implement
//! [`ChatProvider`], translating each vendor's streaming format into
//! [`ModelChunk`]s over the canonical message model.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::llm::types::{ChatOptions, ModelChunk, ProviderCapabilities, ToolDefinition};
use crate::message::Message;

/// A stream of provider chunks.  An `Err` item is a transport or protocol
/// failure and ends the run.
pub type ChunkStream = BoxStream<'static, Result<ModelChunk>>;

/// A language-model backend that streams responses.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider name used in logs (e.g. `"anthropic"`).
    fn name(&self) -> &str;

    /// Native capabilities, consulted when selecting an orchestrator.
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    /// Send the conversation and stream back the model's next turn.
    ///
    /// The final chunk of a successful stream carries a terminal finish
    /// reason.
    async fn send_stream(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<ChunkStream>;
}
