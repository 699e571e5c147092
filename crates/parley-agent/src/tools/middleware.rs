//! Tool-call middleware.
//!
//! Middleware wrap the direct execution path in registration order: the
//! first registered runs outermost.  Each one receives a [`Next`] handle and
//! decides whether (and how often) to continue down the chain.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::ToolError;
use crate::message::ToolCall;
use crate::tools::pipeline::DirectExecutor;
use crate::tools::{Tool, ToolExecutionResult};

/// Wraps the execution of a single tool call.
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    /// Handle `call`.  `tool` is `None` when the name is not registered.
    ///
    /// Call `next.run().await` to continue down the chain, or return a
    /// result directly to short-circuit it.
    async fn intercept(
        &self,
        call: &ToolCall,
        tool: Option<&Arc<dyn Tool>>,
        next: Next<'_>,
    ) -> ToolExecutionResult;
}

/// Handle on the rest of the middleware chain for one call.
#[derive(Clone)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn ToolMiddleware>],
    index: usize,
    call: &'a ToolCall,
    tool: Option<&'a Arc<dyn Tool>>,
    executor: &'a DirectExecutor,
}

impl<'a> Next<'a> {
    pub(crate) fn start(
        chain: &'a [Arc<dyn ToolMiddleware>],
        call: &'a ToolCall,
        tool: Option<&'a Arc<dyn Tool>>,
        executor: &'a DirectExecutor,
    ) -> Self {
        Self {
            chain,
            index: 0,
            call,
            tool,
            executor,
        }
    }

    /// Run the next middleware, or the direct execution path once the chain
    /// is exhausted.
    pub fn run(self) -> BoxFuture<'a, ToolExecutionResult> {
        Box::pin(async move {
            match self.chain.get(self.index) {
                Some(middleware) => {
                    let next = Next {
                        index: self.index + 1,
                        ..self.clone()
                    };
                    middleware.intercept(self.call, self.tool, next).await
                }
                None => self.executor.execute(self.call, self.tool).await,
            }
        })
    }

    /// Middleware still to run after this point.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware
// ---------------------------------------------------------------------------

/// Logs every call and its outcome at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

#[async_trait]
impl ToolMiddleware for LoggingMiddleware {
    async fn intercept(
        &self,
        call: &ToolCall,
        _tool: Option<&Arc<dyn Tool>>,
        next: Next<'_>,
    ) -> ToolExecutionResult {
        tracing::info!(tool = %call.tool_name, call_id = %call.call_id, "tool call started");
        let started = Instant::now();

        let result = next.run().await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result.error {
            None => tracing::info!(
                tool = %call.tool_name,
                call_id = %call.call_id,
                elapsed_ms,
                "tool call completed"
            ),
            Some(error) => tracing::warn!(
                tool = %call.tool_name,
                call_id = %call.call_id,
                elapsed_ms,
                error = %error,
                "tool call failed"
            ),
        }
        result
    }
}

/// Refuses calls to tools on a deny list.
#[derive(Debug, Default, Clone)]
pub struct ToolFilterMiddleware {
    denied: HashSet<String>,
}

impl ToolFilterMiddleware {
    /// Deny the given tool names.
    pub fn deny<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            denied: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `name` is denied.
    pub fn is_denied(&self, name: &str) -> bool {
        self.denied.contains(name)
    }
}

#[async_trait]
impl ToolMiddleware for ToolFilterMiddleware {
    async fn intercept(
        &self,
        call: &ToolCall,
        _tool: Option<&Arc<dyn Tool>>,
        next: Next<'_>,
    ) -> ToolExecutionResult {
        if self.is_denied(&call.tool_name) {
            tracing::warn!(tool = %call.tool_name, call_id = %call.call_id, "tool call denied");
            return ToolExecutionResult::failure(
                call.clone(),
                ToolError::Denied {
                    tool: call.tool_name.clone(),
                    reason: "tool is on the deny list".into(),
                },
            );
        }
        next.run().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolResult;
    use crate::tools::{FunctionTool, ToolPipeline, ToolRegistry};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// Records "<label>-before" and "<label>-after" around `next`.
    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ToolMiddleware for Recording {
        async fn intercept(
            &self,
            _call: &ToolCall,
            _tool: Option<&Arc<dyn Tool>>,
            next: Next<'_>,
        ) -> ToolExecutionResult {
            self.log.lock().unwrap().push(format!("{}-before", self.label));
            let result = next.run().await;
            self.log.lock().unwrap().push(format!("{}-after", self.label));
            result
        }
    }

    /// Upper-cases the payload of successful calls.
    struct Shouting;

    #[async_trait]
    impl ToolMiddleware for Shouting {
        async fn intercept(
            &self,
            _call: &ToolCall,
            _tool: Option<&Arc<dyn Tool>>,
            next: Next<'_>,
        ) -> ToolExecutionResult {
            let mut result = next.run().await;
            if result.is_success() {
                let loud = result.result.result_text().to_uppercase();
                result.result = ToolResult::new(
                    result.call.call_id.clone(),
                    result.call.tool_name.clone(),
                    Value::String(loud),
                );
            }
            result
        }
    }

    /// Replaces failed results with a fixed answer, remembering what failed.
    struct Fallback {
        seen: Arc<Mutex<Vec<(bool, ToolError)>>>,
    }

    #[async_trait]
    impl ToolMiddleware for Fallback {
        async fn intercept(
            &self,
            call: &ToolCall,
            tool: Option<&Arc<dyn Tool>>,
            next: Next<'_>,
        ) -> ToolExecutionResult {
            let result = next.run().await;
            let Some(error) = result.error.clone() else {
                return result;
            };
            self.seen.lock().unwrap().push((tool.is_some(), error));
            ToolExecutionResult::success(call.clone(), "fallback")
        }
    }

    fn recording_registry(log: Arc<Mutex<Vec<String>>>) -> ToolRegistry {
        ToolRegistry::new().with(FunctionTool::new(
            "record",
            "Records its invocation",
            json!({"type": "object"}),
            move |_args: Value| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("direct".into());
                    Ok(json!("ok"))
                }
            },
        ))
    }

    #[tokio::test]
    async fn first_registered_middleware_runs_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ToolPipeline::new()
            .with_middleware(Recording {
                label: "m1",
                log: Arc::clone(&log),
            })
            .with_middleware(Recording {
                label: "m2",
                log: Arc::clone(&log),
            });
        let registry = recording_registry(Arc::clone(&log));

        let result = pipeline
            .execute_single(&ToolCall::from_value("c1", "record", json!({})), &registry)
            .await;

        assert!(result.is_success());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["m1-before", "m2-before", "direct", "m2-after", "m1-after"]
        );
    }

    #[tokio::test]
    async fn filter_short_circuits_denied_tools() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline =
            ToolPipeline::new().with_middleware(ToolFilterMiddleware::deny(["record"]));
        let registry = recording_registry(Arc::clone(&log));

        let result = pipeline
            .execute_single(&ToolCall::from_value("c1", "record", json!({})), &registry)
            .await;

        assert!(matches!(result.error, Some(ToolError::Denied { .. })));
        assert!(log.lock().unwrap().is_empty());
        assert!(result.result.result_text().contains("error"));
    }

    #[tokio::test]
    async fn logging_middleware_passes_result_through() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ToolPipeline::new().with_middleware(LoggingMiddleware);
        let registry = recording_registry(Arc::clone(&log));

        let result = pipeline
            .execute_single(&ToolCall::from_value("c1", "record", json!({})), &registry)
            .await;

        assert!(result.is_success());
        assert_eq!(result.result.result_text(), "ok");
    }

    #[tokio::test]
    async fn middleware_can_rewrite_a_successful_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ToolPipeline::new().with_middleware(Shouting);
        let registry = recording_registry(Arc::clone(&log));

        let result = pipeline
            .execute_single(&ToolCall::from_value("c1", "record", json!({})), &registry)
            .await;

        assert!(result.is_success());
        assert_eq!(result.result.result_text(), "OK");
        assert_eq!(result.result.call_id, "c1");
        assert_eq!(*log.lock().unwrap(), vec!["direct"]);
    }

    #[tokio::test]
    async fn middleware_can_recover_from_a_missing_tool() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ToolPipeline::new().with_middleware(Fallback {
            seen: Arc::clone(&seen),
        });

        let result = pipeline
            .execute_single(
                &ToolCall::from_value("c1", "missing", json!({})),
                &ToolRegistry::new(),
            )
            .await;

        assert!(result.is_success());
        assert!(result.error.is_none());
        assert_eq!(result.result.result_text(), "fallback");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].0);
        assert!(matches!(&seen[0].1, ToolError::NotFound { name } if name == "missing"));
    }

    #[tokio::test]
    async fn middleware_can_recover_from_a_failed_call() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ToolPipeline::new().with_middleware(Fallback {
            seen: Arc::clone(&seen),
        });
        let registry = ToolRegistry::new().with(FunctionTool::new(
            "broken",
            "Always fails",
            json!({"type": "object"}),
            |_args: Value| async { Err(ToolError::failed("broken", "boom")) },
        ));

        let result = pipeline
            .execute_single(&ToolCall::from_value("c1", "broken", json!({})), &registry)
            .await;

        assert!(result.is_success());
        assert_eq!(result.result.result_text(), "fallback");
        let seen = seen.lock().unwrap();
        assert!(seen[0].0);
        assert!(matches!(&seen[0].1, ToolError::Failed { .. }));
    }

    #[test]
    fn remaining_counts_unrun_middleware() {
        let chain: Vec<Arc<dyn ToolMiddleware>> =
            vec![Arc::new(LoggingMiddleware), Arc::new(LoggingMiddleware)];
        let call = ToolCall::from_value("c1", "record", json!({}));
        let executor = DirectExecutor::default();
        let next = Next::start(&chain, &call, None, &executor);
        assert_eq!(next.remaining(), 2);
    }
}
