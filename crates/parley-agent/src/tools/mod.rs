//! Tools and their execution pipeline.
//!
//! - [`Tool`] is what callers implement (or build with [`FunctionTool`]).
//! - [`ToolRegistry`] maps names to tools for one run.
//! - [`ToolPipeline`] runs a batch of calls sequentially, optionally through
//!   an ordered chain of [`ToolMiddleware`].
//!
//! Every call produces exactly one [`ToolExecutionResult`].  Failures are
//! data: the model reads them as `{"error": "..."}` payloads.

pub mod middleware;
pub mod pipeline;
pub mod registry;
pub mod validator;

use std::backtrace::{Backtrace, BacktraceStatus};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{Result, ToolError};
use crate::llm::types::ToolDefinition;
use crate::message::{ToolCall, ToolResult};

pub use middleware::{LoggingMiddleware, Next, ToolFilterMiddleware, ToolMiddleware};
pub use pipeline::{PipelineConfig, ToolPipeline};
pub use registry::ToolRegistry;
pub use validator::{JsonSchemaValidator, SchemaValidator};

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    /// Validator run against the arguments before [`Tool::invoke`].
    fn validator(&self) -> Option<&dyn SchemaValidator> {
        None
    }

    /// Run the tool.  Strings are fed back verbatim, other values
    /// JSON-encoded.
    async fn invoke(&self, arguments: Value) -> std::result::Result<Value, ToolError>;

    /// The definition advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            input_schema: self.input_schema(),
        }
    }
}

type ToolFn =
    dyn Fn(Value) -> BoxFuture<'static, std::result::Result<Value, ToolError>> + Send + Sync;

/// A [`Tool`] backed by an async closure.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    input_schema: Value,
    validator: Option<Arc<JsonSchemaValidator>>,
    func: Arc<ToolFn>,
}

impl FunctionTool {
    /// Wrap `func` as a tool.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        func: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            validator: None,
            func: Arc::new(move |args| Box::pin(func(args))),
        }
    }

    /// Builder: validate arguments against the input schema before every
    /// invocation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AgentError::Validation`] if the schema does not
    /// compile.
    pub fn with_schema_validation(mut self) -> Result<Self> {
        self.validator = Some(Arc::new(JsonSchemaValidator::compile(&self.input_schema)?));
        Ok(self)
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn validator(&self) -> Option<&dyn SchemaValidator> {
        self.validator
            .as_deref()
            .map(|v| v as &dyn SchemaValidator)
    }

    async fn invoke(&self, arguments: Value) -> std::result::Result<Value, ToolError> {
        (self.func)(arguments).await
    }
}

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// The outcome of running one tool call.
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    /// The call that was executed.
    pub call: ToolCall,

    /// The result part fed back to the model.
    pub result: ToolResult,

    /// The captured error, when the call failed.
    pub error: Option<ToolError>,

    /// Backtrace captured with the error, when backtraces are enabled
    /// (`RUST_BACKTRACE=1`).
    pub trace: Option<String>,
}

impl ToolExecutionResult {
    /// A successful result with an already-rendered payload.
    pub fn success(call: ToolCall, payload: impl Into<String>) -> Self {
        let result = ToolResult::new(
            call.call_id.clone(),
            call.tool_name.clone(),
            Value::String(payload.into()),
        );
        Self {
            call,
            result,
            error: None,
            trace: None,
        }
    }

    /// A failed result.  The payload is `{"error": "<message>"}`.
    pub fn failure(call: ToolCall, error: ToolError) -> Self {
        let backtrace = Backtrace::capture();
        let trace =
            (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());
        let result = ToolResult::new(
            call.call_id.clone(),
            call.tool_name.clone(),
            Value::String(error.to_payload()),
        );
        Self {
            call,
            result,
            error: Some(error),
            trace,
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Render a tool's return value: strings pass through, anything else is
/// JSON-encoded.
pub fn render_output(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
