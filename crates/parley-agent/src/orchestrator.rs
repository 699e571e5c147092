//! The model / tool loop.
//!
//! An [`Orchestrator`] alternates between invoking the model and running the
//! tools it asks for, until the model produces a turn without tool calls.
//!
//! ```text
//!        +---------------+  calls   +----------------+
//!  ----> | AwaitingModel | -------> | ExecutingTools |
//!        +---------------+ <------- +----------------+
//!                |          results
//!                | no calls
//!                v
//!             +------+
//!             | Done |
//!             +------+
//! ```
//!
//! Every step appends exactly the turns it produced to the run's history and
//! emits them in a [`StreamedUnit`].  Each received provider chunk is also
//! emitted as a unit so callers can render text live.
//!
//! An empty model turn right after tool results is read as "continue": the
//! model is re-invoked while the run's empty-turn budget lasts
//! ([`OrchestratorConfig::empty_continuation_budget`]).

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::accumulator::{DefaultMessageAccumulator, MessageAccumulator};
use crate::aggregator::TurnAggregator;
use crate::config::OrchestratorConfig;
use crate::error::{AgentError, Result};
use crate::llm::provider::ChatProvider;
use crate::llm::types::{
    ChatOptions, FinalResult, FinishReason, ModelChunk, StreamedUnit, ToolDefinition,
};
use crate::message::{Message, Metadata, ToolCall, ToolResult};
use crate::selection::{
    OrchestratorStrategy, RETURN_RESULT_TOOL, ReturnResultTool, return_result_definition,
    select_orchestrator,
};
use crate::tools::{Tool, ToolExecutionResult, ToolMiddleware, ToolPipeline, ToolRegistry};

/// Metadata key listing the ids of tool results that matched no call.
pub const ORPHANED_RESULTS_KEY: &str = "orphaned_tool_results";

/// Metadata key carrying the run id.
pub const RUN_ID_KEY: &str = "run_id";

/// Metadata key carrying the model invocation count.
pub const ITERATIONS_KEY: &str = "iterations";

/// Metadata key carrying the typed output of a `return_result` run.
pub const STRUCTURED_OUTPUT_KEY: &str = "structured_output";

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Waiting for the model's next turn.
    AwaitingModel,
    /// Running the tool calls of the last model turn.
    ExecutingTools,
    /// Finished.
    Done,
}

/// The mutable state of one run.
///
/// Owned by the run; history only ever grows.
#[derive(Debug)]
pub struct RunState {
    history: Vec<Message>,
    state: OrchestratorState,
    consecutive_empty_turns: u32,
    iterations: u32,
    after_tool_results: bool,
    text_emitted: bool,
    second_pass: bool,
    pending: Option<Message>,
    presented_calls: HashSet<String>,
    orphaned: Vec<String>,
}

impl RunState {
    /// Start a run from the caller's history.
    pub fn new(history: Vec<Message>) -> Self {
        let mut presented_calls = HashSet::new();
        for message in &history {
            for call in message.tool_calls() {
                presented_calls.insert(call.call_id.clone());
            }
        }
        Self {
            history,
            state: OrchestratorState::AwaitingModel,
            consecutive_empty_turns: 0,
            iterations: 0,
            after_tool_results: false,
            text_emitted: false,
            second_pass: false,
            pending: None,
            presented_calls,
            orphaned: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// The conversation so far.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Model invocations so far.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Empty model turns accepted as "continue" in a row.
    pub fn consecutive_empty_turns(&self) -> u32 {
        self.consecutive_empty_turns
    }

    /// Ids of results that matched no call.
    pub fn orphaned(&self) -> &[String] {
        &self.orphaned
    }

    /// Count one model invocation, failing once the cap is reached.
    pub fn begin_invocation(&mut self, max_iterations: u32) -> Result<()> {
        if self.iterations >= max_iterations {
            tracing::warn!(max_iterations, "model invocation limit reached");
            return Err(AgentError::MaxIterationsExceeded { max_iterations });
        }
        self.iterations += 1;
        Ok(())
    }

    /// Apply a consolidated model turn and return the turns appended to
    /// history.
    ///
    /// A turn with tool calls is held back until its results exist, so the
    /// call turn and the result turn are appended together.
    pub fn complete_model_turn(&mut self, turn: Message, empty_budget: u32) -> Vec<Message> {
        for call in turn.tool_calls() {
            self.presented_calls.insert(call.call_id.clone());
        }
        self.note_orphans(turn.tool_results_iter());

        if turn.has_tool_calls() {
            self.consecutive_empty_turns = 0;
            self.pending = Some(turn);
            self.state = OrchestratorState::ExecutingTools;
            return Vec::new();
        }

        let continuation =
            turn.is_empty() && (self.after_tool_results || self.consecutive_empty_turns > 0);
        self.after_tool_results = false;
        self.history.push(turn.clone());

        if continuation && self.consecutive_empty_turns < empty_budget {
            self.consecutive_empty_turns += 1;
            tracing::info!(
                consecutive_empty_turns = self.consecutive_empty_turns,
                empty_budget,
                "empty model turn after tool results, re-invoking model"
            );
            self.state = OrchestratorState::AwaitingModel;
        } else {
            if continuation {
                tracing::info!(empty_budget, "empty continuation budget exhausted, ending run");
            }
            self.consecutive_empty_turns = 0;
            self.state = OrchestratorState::Done;
        }

        vec![turn]
    }

    /// The calls of the turn awaiting execution.
    pub fn pending_calls(&self) -> Vec<ToolCall> {
        self.pending
            .as_ref()
            .map(|turn| turn.tool_calls().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append the pending call turn and a user turn carrying `results`, and
    /// return both.
    pub fn complete_tool_batch(&mut self, results: &[ToolExecutionResult]) -> Result<Vec<Message>> {
        let turn = self
            .pending
            .take()
            .ok_or_else(|| {
                AgentError::Internal("tool results without a pending call turn".into())
            })?;

        self.note_orphans(results.iter().map(|r| &r.result));
        let results_turn = Message::tool_results(results.iter().map(|r| r.result.clone()));

        self.history.push(turn.clone());
        self.history.push(results_turn.clone());
        self.after_tool_results = true;
        self.state = OrchestratorState::AwaitingModel;

        Ok(vec![turn, results_turn])
    }

    /// Append a model turn carrying the run's typed output and finish.
    pub fn finish_with_output(&mut self, output: impl Into<String>) -> Message {
        let turn = Message::model_text(output);
        self.history.push(turn.clone());
        self.state = OrchestratorState::Done;
        turn
    }

    /// Stop the run, keeping whatever was produced so far.
    ///
    /// A pending call turn is kept with the results that completed; a
    /// partial model turn is kept if it has any parts.
    pub fn cancel(
        &mut self,
        partial: Option<Message>,
        results: &[ToolExecutionResult],
    ) -> Vec<Message> {
        let mut appended = Vec::new();
        if let Some(turn) = self.pending.take() {
            appended.push(turn);
            if !results.is_empty() {
                appended.push(Message::tool_results(results.iter().map(|r| r.result.clone())));
            }
        }
        if let Some(turn) = partial.filter(|t| !t.is_empty()) {
            appended.push(turn);
        }

        self.history.extend(appended.iter().cloned());
        self.state = OrchestratorState::Done;
        appended
    }

    /// Consume the state, returning the full history.
    pub fn into_history(self) -> Vec<Message> {
        self.history
    }

    fn enter_second_pass(&mut self) {
        self.second_pass = true;
        self.consecutive_empty_turns = 0;
        self.after_tool_results = false;
        self.state = OrchestratorState::AwaitingModel;
    }

    fn note_orphans<'a>(&mut self, results: impl IntoIterator<Item = &'a ToolResult>) {
        for result in results {
            if !self.presented_calls.contains(&result.call_id) {
                tracing::warn!(
                    call_id = %result.call_id,
                    tool = %result.tool_name,
                    "tool result has no matching call"
                );
                self.orphaned.push(result.call_id.clone());
            }
        }
    }

    /// Turn one provider chunk into a unit, prefixing the first text of a
    /// later model turn with a newline.
    fn chunk_unit(
        &self,
        chunk: ModelChunk,
        turn_has_text: &mut bool,
        prefix: bool,
    ) -> StreamedUnit {
        let mut text = chunk.output.text();
        if !text.is_empty() {
            if prefix && self.text_emitted && !*turn_has_text {
                text.insert(0, '\n');
            }
            *turn_has_text = true;
        }

        StreamedUnit {
            text,
            thinking: chunk.output.thinking(),
            messages: Vec::new(),
            finish_reason: chunk.finish_reason,
            metadata: chunk.metadata,
            usage: chunk.usage,
        }
    }

    fn final_metadata(&self, run_id: Uuid) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(RUN_ID_KEY.into(), json!(run_id.to_string()));
        metadata.insert(ITERATIONS_KEY.into(), json!(self.iterations));
        if !self.orphaned.is_empty() {
            metadata.insert(ORPHANED_RESULTS_KEY.into(), json!(self.orphaned));
        }
        metadata
    }
}

fn settle_finish_reason(reported: FinishReason, has_calls: bool) -> FinishReason {
    match reported {
        FinishReason::Unspecified if has_calls => FinishReason::ToolCalls,
        FinishReason::Unspecified => FinishReason::Stop,
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Everything a run needs that depends on the registry and strategy.
struct RunPlan {
    strategy: OrchestratorStrategy,
    tools: Vec<ToolDefinition>,
    registry: ToolRegistry,
    options: ChatOptions,
    final_options: ChatOptions,
    /// The caller registered a tool under the `return_result` name.
    shadowed_tool: bool,
}

/// Drives the model / tool loop against one provider.
pub struct Orchestrator {
    provider: Arc<dyn ChatProvider>,
    pipeline: ToolPipeline,
    accumulator: Arc<dyn MessageAccumulator>,
    config: OrchestratorConfig,
    strategy: Option<OrchestratorStrategy>,
    server_side_tools: bool,
}

impl Orchestrator {
    /// Create an orchestrator with default settings.
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            pipeline: ToolPipeline::new(),
            accumulator: Arc::new(DefaultMessageAccumulator),
            config: OrchestratorConfig::default(),
            strategy: None,
            server_side_tools: false,
        }
    }

    /// Builder: replace the configuration.  The tool timeout is applied to
    /// the pipeline.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.pipeline.set_timeout(config.tool_timeout());
        self.config = config;
        self
    }

    /// Builder: replace the tool pipeline.
    ///
    /// Middleware added earlier through [`with_middleware`](Self::with_middleware)
    /// goes with the old pipeline.  A tool timeout from the configuration is
    /// applied to the new one.
    pub fn with_pipeline(mut self, mut pipeline: ToolPipeline) -> Self {
        if let Some(timeout) = self.config.tool_timeout() {
            pipeline.set_timeout(Some(timeout));
        }
        self.pipeline = pipeline;
        self
    }

    /// Builder: append a tool middleware.
    pub fn with_middleware(mut self, middleware: impl ToolMiddleware + 'static) -> Self {
        self.pipeline.push_middleware(Arc::new(middleware));
        self
    }

    /// Builder: replace the delta accumulator.
    pub fn with_accumulator(mut self, accumulator: Arc<dyn MessageAccumulator>) -> Self {
        self.accumulator = accumulator;
        self
    }

    /// Builder: force a strategy instead of selecting one from the
    /// provider's capabilities.
    pub fn with_strategy(mut self, strategy: OrchestratorStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Builder: the provider runs tools of its own.
    pub fn with_server_side_tools(mut self, enabled: bool) -> Self {
        self.server_side_tools = enabled;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The strategy a run with `registry` would use.
    pub fn strategy_for(&self, registry: &ToolRegistry) -> OrchestratorStrategy {
        self.plan(registry.clone()).strategy
    }

    fn plan(&self, mut registry: ToolRegistry) -> RunPlan {
        let definitions = registry.definitions();
        let schema = self.config.options.output_schema.as_ref();

        let (mut strategy, mut tools) = match self.strategy {
            Some(forced) => (forced, definitions),
            None => {
                let selection = select_orchestrator(
                    self.provider.capabilities(),
                    schema,
                    &definitions,
                    self.server_side_tools,
                );
                (selection.strategy, selection.tools)
            }
        };

        let mut options = self.config.options.clone();
        let mut shadowed_tool = false;
        match (strategy, schema) {
            (OrchestratorStrategy::ReturnResultTool, Some(schema)) => {
                let tool = ReturnResultTool::new(schema);
                tools.retain(|t| t.name != RETURN_RESULT_TOOL);
                tools.push(return_result_definition(schema));
                shadowed_tool = registry.register(Arc::new(tool) as Arc<dyn Tool>).is_some();
                options.output_schema = None;
            }
            (OrchestratorStrategy::ReturnResultTool, None) => {
                tracing::warn!(
                    "return_result strategy needs an output schema, running the default loop"
                );
                strategy = OrchestratorStrategy::Default;
            }
            (OrchestratorStrategy::TwoPass, Some(_)) => options.output_schema = None,
            (OrchestratorStrategy::TwoPass, None) => {
                tracing::warn!(
                    "two-pass strategy needs an output schema, running the default loop"
                );
                strategy = OrchestratorStrategy::Default;
            }
            (OrchestratorStrategy::Default, _) => {}
        }

        RunPlan {
            strategy,
            tools,
            registry,
            options,
            final_options: self.config.options.clone(),
            shadowed_tool,
        }
    }

    /// Run the loop, streaming one unit per provider chunk and one per
    /// completed step.
    ///
    /// The stream ends after the unit of the final step.  A provider error
    /// is yielded as the last item.  Cancelling `cancel` ends the run with a
    /// [`FinishReason::Cancelled`] unit carrying the partial turns.
    pub fn run_stream(
        &self,
        history: Vec<Message>,
        registry: ToolRegistry,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<StreamedUnit>> {
        let RunPlan {
            strategy,
            tools,
            registry,
            options,
            final_options,
            shadowed_tool,
        } = self.plan(registry);
        let provider = Arc::clone(&self.provider);
        let pipeline = self.pipeline.clone();
        let accumulator = Arc::clone(&self.accumulator);
        let config = self.config.clone();
        let run_id = Uuid::now_v7();

        let stream = try_stream! {
            let mut run = RunState::new(history);

            tracing::info!(
                run_id = %run_id,
                provider = provider.name(),
                strategy = ?strategy,
                tool_count = tools.len(),
                max_iterations = config.max_iterations,
                "starting run"
            );
            if shadowed_tool {
                tracing::warn!(
                    run_id = %run_id,
                    tool = RETURN_RESULT_TOOL,
                    "caller tool replaced by the typed output tool for this run"
                );
            }

            loop {
                match run.state {
                    OrchestratorState::AwaitingModel => {
                        run.begin_invocation(config.max_iterations)?;
                        let turn_tools: &[ToolDefinition] =
                            if run.second_pass { &[] } else { tools.as_slice() };
                        let turn_options: &ChatOptions =
                            if run.second_pass { &final_options } else { &options };

                        tracing::debug!(
                            run_id = %run_id,
                            iteration = run.iterations,
                            history_len = run.history.len(),
                            second_pass = run.second_pass,
                            "invoking model"
                        );

                        let request = provider.send_stream(&run.history, turn_tools, turn_options);
                        let opened = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            opened = request => Some(opened),
                        };
                        let mut chunks = match opened {
                            Some(opened) => opened?,
                            None => {
                                tracing::info!(
                                    run_id = %run_id,
                                    "run cancelled before model response"
                                );
                                let messages = run.cancel(None, &[]);
                                let mut unit =
                                    StreamedUnit::with_messages(messages, FinishReason::Cancelled);
                                unit.metadata = run.final_metadata(run_id);
                                yield unit;
                                break;
                            }
                        };

                        let mut partial = Message::empty_model();
                        let mut reported = FinishReason::Unspecified;
                        let mut turn_has_text = false;
                        let mut cancelled = false;

                        loop {
                            let next = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => {
                                    cancelled = true;
                                    None
                                }
                                item = chunks.next() => item,
                            };
                            let chunk = match next {
                                Some(item) => item?,
                                None => break,
                            };

                            if chunk.finish_reason != FinishReason::Unspecified {
                                reported = chunk.finish_reason;
                            }
                            partial = accumulator.accumulate(&partial, &chunk.output);
                            let unit = run.chunk_unit(
                                chunk,
                                &mut turn_has_text,
                                config.prefix_text_between_turns,
                            );
                            yield unit;
                        }

                        let turn = accumulator.consolidate(&partial);
                        if turn_has_text {
                            run.text_emitted = true;
                        }

                        if cancelled {
                            tracing::info!(
                                run_id = %run_id,
                                parts = turn.parts.len(),
                                "run cancelled while streaming"
                            );
                            let messages = run.cancel(Some(turn), &[]);
                            let mut unit =
                                StreamedUnit::with_messages(messages, FinishReason::Cancelled);
                            unit.metadata = run.final_metadata(run_id);
                            yield unit;
                            break;
                        }

                        let finish_reason = settle_finish_reason(reported, turn.has_tool_calls());
                        let messages =
                            run.complete_model_turn(turn, config.empty_continuation_budget);

                        if run.state == OrchestratorState::Done
                            && strategy == OrchestratorStrategy::TwoPass
                            && !run.second_pass
                        {
                            tracing::info!(
                                run_id = %run_id,
                                "tool pass finished, requesting typed output"
                            );
                            run.enter_second_pass();
                        }

                        if !messages.is_empty() {
                            let mut unit = StreamedUnit::with_messages(messages, finish_reason);
                            if run.state == OrchestratorState::Done {
                                unit.metadata = run.final_metadata(run_id);
                            }
                            yield unit;
                        }
                    }

                    OrchestratorState::ExecutingTools => {
                        let calls = run.pending_calls();
                        tracing::info!(
                            run_id = %run_id,
                            iteration = run.iterations,
                            tool_count = calls.len(),
                            tools = ?calls.iter().map(|c| c.tool_name.as_str()).collect::<Vec<_>>(),
                            "executing tool calls"
                        );

                        let results = pipeline
                            .execute_batch_with_cancel(&calls, &registry, &cancel)
                            .await;

                        if results.len() < calls.len() {
                            tracing::info!(
                                run_id = %run_id,
                                completed = results.len(),
                                total = calls.len(),
                                "run cancelled during tool execution"
                            );
                            let messages = run.cancel(None, &results);
                            let mut unit =
                                StreamedUnit::with_messages(messages, FinishReason::Cancelled);
                            unit.metadata = run.final_metadata(run_id);
                            yield unit;
                            break;
                        }

                        let structured = if strategy == OrchestratorStrategy::ReturnResultTool {
                            results
                                .iter()
                                .find(|r| r.call.tool_name == RETURN_RESULT_TOOL && r.is_success())
                                .map(|r| Value::Object(r.call.arguments.clone()))
                        } else {
                            None
                        };

                        let mut messages = run.complete_tool_batch(&results)?;

                        match structured {
                            Some(value) => {
                                let rendered = value.to_string();
                                messages.push(run.finish_with_output(rendered.clone()));
                                let mut unit =
                                    StreamedUnit::with_messages(messages, FinishReason::Stop);
                                let prefix = config.prefix_text_between_turns && run.text_emitted;
                                unit.text = if prefix {
                                    format!("\n{rendered}")
                                } else {
                                    rendered
                                };
                                unit.metadata = run.final_metadata(run_id);
                                unit.metadata.insert(STRUCTURED_OUTPUT_KEY.into(), value);
                                yield unit;
                            }
                            None => {
                                yield StreamedUnit::with_messages(
                                    messages,
                                    FinishReason::ToolCalls,
                                );
                            }
                        }
                    }

                    OrchestratorState::Done => break,
                }
            }

            tracing::info!(
                run_id = %run_id,
                iterations = run.iterations,
                history_len = run.history.len(),
                orphaned = run.orphaned.len(),
                "run finished"
            );
        };

        Box::pin(stream)
    }

    /// Run to completion and fold the output into a [`FinalResult`].
    ///
    /// `FinalResult::messages` holds the turns the run appended, not the
    /// caller's history.
    pub async fn run(&self, history: Vec<Message>, registry: ToolRegistry) -> Result<FinalResult> {
        self.run_with_cancel(history, registry, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires.  A
    /// cancelled run is not an error: the result carries the partial turns
    /// and [`FinishReason::Cancelled`].
    pub async fn run_with_cancel(
        &self,
        history: Vec<Message>,
        registry: ToolRegistry,
        cancel: CancellationToken,
    ) -> Result<FinalResult> {
        let mut stream = self.run_stream(history, registry, cancel);
        let mut aggregator = TurnAggregator::new();
        while let Some(unit) = stream.next().await {
            aggregator.add(&unit?);
        }
        Ok(aggregator.build_final())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .field("strategy", &self.strategy)
            .field("server_side_tools", &self.server_side_tools)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
