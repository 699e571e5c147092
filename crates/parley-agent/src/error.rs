//! Agent error types.
//!
//! Runtime failures surface through [`AgentError`].  Tool failures are a
//! separate concern: they are captured as [`ToolError`] values inside a
//! [`crate::tools::ToolExecutionResult`] and fed back to the model as data,
//! so they never abort a run.

use std::time::Duration;

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Provider errors -----------------------------------------------------
    /// The provider failed to open a stream (transport or protocol failure).
    #[error("provider request failed: {reason}")]
    Provider { reason: String },

    /// An already-open provider stream yielded an error.
    #[error("provider stream error: {reason}")]
    Stream { reason: String },

    // -- Runtime errors ------------------------------------------------------
    /// The orchestration loop invoked the model more times than allowed.
    #[error("orchestration exceeded max iterations ({max_iterations})")]
    MaxIterationsExceeded { max_iterations: u32 },

    // -- Configuration errors ------------------------------------------------
    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Validation failed for input data (e.g. an uncompilable schema).
    #[error("validation error: {reason}")]
    Validation { reason: String },

    // -- Upstream errors -----------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a configuration or script file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal agent error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

/// A failed tool invocation.
///
/// The `Display` output is what the model reads inside the
/// `{"error": "<message>"}` payload, so messages are phrased for it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// No tool with this name exists in the active registry.
    #[error("Tool {name} not found")]
    NotFound { name: String },

    /// The arguments did not satisfy the tool's input schema.
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The tool itself reported a failure.
    #[error("{message}")]
    Failed { tool: String, message: String },

    /// The invocation did not finish within the configured timeout.
    #[error("tool `{tool}` timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    /// A middleware refused to run the tool.
    #[error("tool `{tool}` denied: {reason}")]
    Denied { tool: String, reason: String },
}

impl ToolError {
    /// Shorthand for a [`ToolError::Failed`] raised by a tool implementation.
    pub fn failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Render the error as the JSON payload stored in a result part.
    pub fn to_payload(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}
