//! Sequential tool execution.
//!
//! [`ToolPipeline`] runs the calls of one model turn strictly one after
//! another, in the order the model issued them.  Each call passes through the
//! middleware chain and then the direct path:
//!
//! 1. Resolve the tool by name (unknown names fail with
//!    [`ToolError::NotFound`]).
//! 2. Validate the arguments if the tool supplies a validator.
//! 3. Invoke, optionally under a timeout.
//! 4. Render the output, or capture the error as a result payload.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::message::ToolCall;
use crate::tools::middleware::{Next, ToolMiddleware};
use crate::tools::{Tool, ToolExecutionResult, ToolRegistry, render_output};

/// Pipeline settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Per-call time limit.  `None` means no limit.
    #[serde(default, with = "optional_secs")]
    pub tool_timeout: Option<Duration>,
}

/// The innermost step of the chain: run the tool itself.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DirectExecutor {
    timeout: Option<Duration>,
}

impl DirectExecutor {
    pub(crate) async fn execute(
        &self,
        call: &ToolCall,
        tool: Option<&Arc<dyn Tool>>,
    ) -> ToolExecutionResult {
        let Some(tool) = tool else {
            tracing::warn!(tool = %call.tool_name, call_id = %call.call_id, "tool not found");
            return ToolExecutionResult::failure(
                call.clone(),
                ToolError::NotFound {
                    name: call.tool_name.clone(),
                },
            );
        };

        let arguments = Value::Object(call.arguments.clone());

        if let Some(validator) = tool.validator() {
            if let Err(reason) = validator.validate(&arguments) {
                tracing::warn!(
                    tool = %call.tool_name,
                    call_id = %call.call_id,
                    %reason,
                    "tool arguments rejected"
                );
                return ToolExecutionResult::failure(
                    call.clone(),
                    ToolError::InvalidArguments {
                        tool: call.tool_name.clone(),
                        reason,
                    },
                );
            }
        }

        tracing::debug!(tool = %call.tool_name, call_id = %call.call_id, "invoking tool");

        let invocation = tool.invoke(arguments);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ToolError::Timeout {
                    tool: call.tool_name.clone(),
                    after: limit,
                }),
            },
            None => invocation.await,
        };

        match outcome {
            Ok(value) => ToolExecutionResult::success(call.clone(), render_output(value)),
            Err(error) => {
                tracing::warn!(
                    tool = %call.tool_name,
                    call_id = %call.call_id,
                    error = %error,
                    "tool invocation failed"
                );
                ToolExecutionResult::failure(call.clone(), error)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Executes tool calls through an ordered middleware chain.
#[derive(Clone, Default)]
pub struct ToolPipeline {
    middleware: Vec<Arc<dyn ToolMiddleware>>,
    executor: DirectExecutor,
}

impl ToolPipeline {
    /// A pipeline with no middleware and no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipeline from settings.
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            middleware: Vec::new(),
            executor: DirectExecutor {
                timeout: config.tool_timeout,
            },
        }
    }

    /// Builder: append a middleware.  Earlier registrations run outermost.
    pub fn with_middleware(mut self, middleware: impl ToolMiddleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Append a shared middleware.
    pub fn push_middleware(&mut self, middleware: Arc<dyn ToolMiddleware>) {
        self.middleware.push(middleware);
    }

    /// Builder: limit every tool invocation to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.executor.timeout = Some(timeout);
        self
    }

    /// Replace the per-call time limit.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.executor.timeout = timeout;
    }

    /// The per-call time limit, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.executor.timeout
    }

    /// Number of registered middleware.
    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }

    /// Execute one call.  Never fails: errors come back inside the result.
    pub async fn execute_single(
        &self,
        call: &ToolCall,
        registry: &ToolRegistry,
    ) -> ToolExecutionResult {
        let tool = registry.get(&call.tool_name);
        Next::start(&self.middleware, call, tool, &self.executor).run().await
    }

    /// Execute `calls` in order, one at a time.  The output has one result
    /// per call, in input order.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCall],
        registry: &ToolRegistry,
    ) -> Vec<ToolExecutionResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_single(call, registry).await);
        }
        results
    }

    /// Like [`execute_batch`](Self::execute_batch), but stops when `cancel`
    /// fires.  A call in flight at that moment is abandoned; the results
    /// gathered before it are returned.
    pub async fn execute_batch_with_cancel(
        &self,
        calls: &[ToolCall],
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Vec<ToolExecutionResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        completed = results.len(),
                        total = calls.len(),
                        "tool batch cancelled"
                    );
                    break;
                }
                result = self.execute_single(call, registry) => results.push(result),
            }
        }
        results
    }
}

impl std::fmt::Debug for ToolPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolPipeline")
            .field("middleware", &self.middleware.len())
            .field("executor", &self.executor)
            .finish()
    }
}

/// Serde adapter: `Option<Duration>` as whole seconds.
mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use serde_json::json;
    use std::sync::Mutex;

    fn registry(log: Arc<Mutex<Vec<String>>>) -> ToolRegistry {
        let slow_log = Arc::clone(&log);
        let fast_log = Arc::clone(&log);
        ToolRegistry::new()
            .with(FunctionTool::new(
                "slow",
                "Sleeps first",
                json!({"type": "object"}),
                move |_args: Value| {
                    let log = Arc::clone(&slow_log);
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        log.lock().unwrap().push("slow".into());
                        Ok(json!("slow done"))
                    }
                },
            ))
            .with(FunctionTool::new(
                "fast",
                "Returns immediately",
                json!({"type": "object"}),
                move |_args: Value| {
                    let log = Arc::clone(&fast_log);
                    async move {
                        log.lock().unwrap().push("fast".into());
                        Ok(json!({"n": 1}))
                    }
                },
            ))
            .with(FunctionTool::new(
                "broken",
                "Always fails",
                json!({"type": "object"}),
                |_args: Value| async { Err(ToolError::failed("broken", "disk on fire")) },
            ))
            .with(FunctionTool::new(
                "hang",
                "Never returns",
                json!({"type": "object"}),
                |_args: Value| async {
                    std::future::pending::<()>().await;
                    Ok(Value::Null)
                },
            ))
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::from_value(id, name, json!({}))
    }

    #[tokio::test]
    async fn batch_runs_sequentially_in_call_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let reg = registry(Arc::clone(&log));
        let pipeline = ToolPipeline::new();

        let results = pipeline
            .execute_batch(&[call("a", "slow"), call("b", "fast")], &reg)
            .await;

        assert_eq!(*log.lock().unwrap(), vec!["slow", "fast"]);
        let ids: Vec<_> = results.iter().map(|r| r.result.call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(results[0].result.result_text(), "slow done");
        assert_eq!(results[1].result.result_text(), r#"{"n":1}"#);
    }

    #[tokio::test]
    async fn unknown_tool_yields_not_found_payload() {
        let reg = registry(Arc::new(Mutex::new(Vec::new())));
        let result = ToolPipeline::new().execute_single(&call("x", "nope"), &reg).await;

        assert!(matches!(result.error, Some(ToolError::NotFound { ref name }) if name == "nope"));
        let parsed: Value = serde_json::from_str(&result.result.result_text()).unwrap();
        assert_eq!(parsed["error"], "Tool nope not found");
    }

    #[tokio::test]
    async fn tool_error_becomes_error_payload() {
        let reg = registry(Arc::new(Mutex::new(Vec::new())));
        let result = ToolPipeline::new().execute_single(&call("x", "broken"), &reg).await;

        assert!(!result.is_success());
        let parsed: Value = serde_json::from_str(&result.result.result_text()).unwrap();
        assert_eq!(parsed["error"], "disk on fire");
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_tool() {
        let invoked = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&invoked);
        let reg = ToolRegistry::new().with(
            FunctionTool::new(
                "weather",
                "Weather lookup",
                json!({
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                }),
                move |_args: Value| {
                    let flag = Arc::clone(&flag);
                    async move {
                        *flag.lock().unwrap() = true;
                        Ok(json!("sunny"))
                    }
                },
            )
            .with_schema_validation()
            .unwrap(),
        );

        let result = ToolPipeline::new().execute_single(&call("w", "weather"), &reg).await;

        assert!(matches!(result.error, Some(ToolError::InvalidArguments { .. })));
        assert!(!*invoked.lock().unwrap());
    }

    #[tokio::test]
    async fn timeout_is_reported_as_tool_error() {
        let reg = registry(Arc::new(Mutex::new(Vec::new())));
        let pipeline = ToolPipeline::new().with_timeout(Duration::from_millis(20));

        let result = pipeline.execute_single(&call("h", "hang"), &reg).await;

        assert!(matches!(result.error, Some(ToolError::Timeout { .. })));
    }

    #[tokio::test]
    async fn cancelled_batch_returns_completed_prefix() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let reg = registry(Arc::clone(&log));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let results = ToolPipeline::new()
            .execute_batch_with_cancel(
                &[call("a", "fast"), call("b", "hang"), call("c", "fast")],
                &reg,
                &cancel,
            )
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result.call_id, "a");
        assert_eq!(*log.lock().unwrap(), vec!["fast"]);
    }

    #[test]
    fn config_reads_timeout_in_seconds() {
        let config: PipelineConfig = serde_json::from_value(json!({"tool_timeout": 30})).unwrap();
        assert_eq!(config.tool_timeout, Some(Duration::from_secs(30)));
        let config: PipelineConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.tool_timeout, None);
    }
}
