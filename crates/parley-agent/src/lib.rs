//! Provider-agnostic conversational agent runtime.
//!
//! Parley normalizes streamed model output into a canonical message model,
//! folds partial deltas into complete turns, runs tool calls through an
//! interceptable pipeline, and drives the model / tool loop to completion.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ chunks ┌─────────────┐ units ┌────────────┐
//! │ ChatProvider │──────> │ Orchestrator│─────> │ Aggregator │
//! └──────────────┘        └──────┬──────┘       └────────────┘
//!                                │ calls
//!                         ┌──────┴──────┐
//!                         │ ToolPipeline│──> middleware ──> Tool
//!                         └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`message`] -- Turns, parts, tool calls and results.
//! - [`accumulator`] -- Merging streamed deltas and consolidating turns.
//! - [`aggregator`] -- Folding streamed units into a final result.
//! - [`tools`] -- Tool trait, registry, validation, middleware, pipeline.
//! - [`orchestrator`] -- The AwaitingModel / ExecutingTools / Done loop.
//! - [`selection`] -- Strategy selection for typed output.
//! - [`llm`] -- Provider trait and wire-neutral types.
//! - [`config`] -- Orchestrator settings.
//! - [`error`] -- Error types.

pub mod accumulator;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod llm;
pub mod message;
pub mod orchestrator;
pub mod selection;
pub mod tools;

// Re-export the most commonly used types at the crate root.
pub use accumulator::{DefaultMessageAccumulator, MessageAccumulator, accumulate, consolidate};
pub use aggregator::TurnAggregator;
pub use config::OrchestratorConfig;
pub use error::{AgentError, Result, ToolError};
pub use llm::{
    ChatOptions, ChatProvider, FinalResult, FinishReason, ModelChunk, ProviderCapabilities,
    ScriptedProvider, ScriptedTurn, StreamedUnit, ToolDefinition, Usage,
};
pub use message::{Message, Metadata, Part, Role, ToolCall, ToolPart, ToolResult};
pub use orchestrator::{Orchestrator, OrchestratorState, RunState};
pub use selection::{OrchestratorSelection, OrchestratorStrategy, select_orchestrator};
pub use tools::{
    FunctionTool, JsonSchemaValidator, LoggingMiddleware, Next, PipelineConfig, SchemaValidator,
    Tool, ToolExecutionResult, ToolFilterMiddleware, ToolMiddleware, ToolPipeline, ToolRegistry,
};
