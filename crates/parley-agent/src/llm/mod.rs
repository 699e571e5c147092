//! Language-model boundary.
//!
//! - [`types`] -- Chunks, streamed units, finish reasons, options and usage.
//! - [`provider`] -- The [`ChatProvider`] trait wire clients implement.
//! - [`scripted`] -- A provider that replays canned turns.

pub mod provider;
pub mod scripted;
pub mod types;

pub use provider::{ChatProvider, ChunkStream};
pub use scripted::{RecordedRequest, ScriptedProvider, ScriptedTurn};
pub use types::{
    ChatOptions, FinalResult, FinishReason, ModelChunk, ProviderCapabilities, StreamedUnit,
    ToolDefinition, Usage,
};
