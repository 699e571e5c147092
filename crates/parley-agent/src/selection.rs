//! Choosing an orchestration strategy.
//!
//! Providers differ in how they combine typed (schema-constrained) output
//! with tool use.  [`select_orchestrator`] is a pure function that maps a
//! provider's capabilities and the request shape onto one of three
//! strategies, each honouring the same AwaitingModel / ExecutingTools / Done
//! contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::llm::types::{ProviderCapabilities, ToolDefinition};
use crate::tools::{JsonSchemaValidator, SchemaValidator, Tool};

/// Name of the synthetic tool used for typed output.
pub const RETURN_RESULT_TOOL: &str = "return_result";

/// How the orchestrator drives a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorStrategy {
    /// Plain tool loop.  Any output schema is passed to the provider as is.
    #[default]
    Default,
    /// Typed output through an injected `return_result` tool whose input
    /// schema is the output schema.
    ReturnResultTool,
    /// Tool loop without the schema, then one schema-constrained pass
    /// without tools.
    TwoPass,
}

/// The outcome of [`select_orchestrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSelection {
    /// Strategy to run.
    pub strategy: OrchestratorStrategy,
    /// Tool definitions to offer the model, possibly rewritten.
    pub tools: Vec<ToolDefinition>,
}

/// Pick a strategy for a request.
///
/// - No output schema, or native support for typed output with tools:
///   [`OrchestratorStrategy::Default`].
/// - Output schema and provider-side (server) tools:
///   [`OrchestratorStrategy::TwoPass`].
/// - Output schema without any client tools: [`OrchestratorStrategy::Default`].
/// - Otherwise [`OrchestratorStrategy::ReturnResultTool`], with the
///   `return_result` tool appended.
pub fn select_orchestrator(
    capabilities: ProviderCapabilities,
    output_schema: Option<&Value>,
    tools: &[ToolDefinition],
    has_server_side_tools: bool,
) -> OrchestratorSelection {
    let unchanged = |strategy| OrchestratorSelection {
        strategy,
        tools: tools.to_vec(),
    };

    let Some(schema) = output_schema else {
        return unchanged(OrchestratorStrategy::Default);
    };
    if capabilities.typed_output_with_tools {
        return unchanged(OrchestratorStrategy::Default);
    }
    if has_server_side_tools {
        return unchanged(OrchestratorStrategy::TwoPass);
    }
    if tools.is_empty() {
        return unchanged(OrchestratorStrategy::Default);
    }

    let mut tools = tools.to_vec();
    tools.push(return_result_definition(schema));
    OrchestratorSelection {
        strategy: OrchestratorStrategy::ReturnResultTool,
        tools,
    }
}

/// Definition of the synthetic `return_result` tool for `schema`.
pub fn return_result_definition(schema: &Value) -> ToolDefinition {
    ToolDefinition {
        name: RETURN_RESULT_TOOL.to_owned(),
        description: "Return the final answer. Call this exactly once, when you are done, \
                      with arguments matching the required output format."
            .to_owned(),
        input_schema: schema.clone(),
    }
}

// ---------------------------------------------------------------------------
// The return_result tool
// ---------------------------------------------------------------------------

/// The tool injected by [`OrchestratorStrategy::ReturnResultTool`].
///
/// Invoking it only acknowledges the answer; the orchestrator reads the
/// arguments of a successful call as the run's output.
pub(crate) struct ReturnResultTool {
    definition: ToolDefinition,
    validator: Option<JsonSchemaValidator>,
}

impl ReturnResultTool {
    pub(crate) fn new(schema: &Value) -> Self {
        let validator = match JsonSchemaValidator::compile(schema) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "output schema does not compile, return_result arguments are unchecked"
                );
                None
            }
        };
        Self {
            definition: return_result_definition(schema),
            validator,
        }
    }
}

#[async_trait]
impl Tool for ReturnResultTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn input_schema(&self) -> Value {
        self.definition.input_schema.clone()
    }

    fn validator(&self) -> Option<&dyn SchemaValidator> {
        self.validator.as_ref().map(|v| v as &dyn SchemaValidator)
    }

    async fn invoke(&self, _arguments: Value) -> std::result::Result<Value, ToolError> {
        Ok(Value::String("Result recorded.".into()))
    }
}
