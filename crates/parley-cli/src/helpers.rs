//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration and script loading, and
//! the built-in demo tools.

use std::path::Path;

use anyhow::{Context, Result};
use parley_agent::{FunctionTool, OrchestratorConfig, ScriptedProvider, ToolError, ToolRegistry};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load the orchestrator configuration, falling back to defaults when no
/// path is given.
pub fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            info!("no config file given, using defaults");
            Ok(OrchestratorConfig::default())
        }
    }
}

/// Read a scripted transcript.
pub fn load_script(path: &Path) -> Result<ScriptedProvider> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    let provider = ScriptedProvider::from_json(&content)
        .with_context(|| format!("failed to parse script {}", path.display()))?;
    info!(path = %path.display(), turns = provider.remaining(), "script loaded");
    Ok(provider)
}

// ---------------------------------------------------------------------------
// Built-in tools
// ---------------------------------------------------------------------------

/// The demo tools available to replayed transcripts.
pub fn builtin_tools() -> Result<ToolRegistry> {
    let echo = FunctionTool::new(
        "echo",
        "Return the `text` argument unchanged.",
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        }),
        |args: Value| async move {
            let text = args["text"].as_str().unwrap_or_default();
            Ok(Value::String(text.to_owned()))
        },
    )
    .with_schema_validation()?;

    let add = FunctionTool::new(
        "add",
        "Add two numbers `a` and `b`.",
        json!({
            "type": "object",
            "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
            "required": ["a", "b"]
        }),
        |args: Value| async move {
            let (Some(a), Some(b)) = (args["a"].as_f64(), args["b"].as_f64()) else {
                return Err(ToolError::failed("add", "both `a` and `b` must be numbers"));
            };
            Ok(json!({ "sum": a + b }))
        },
    )
    .with_schema_validation()?;

    let fail = FunctionTool::new(
        "fail",
        "Always fails with the given `message`.",
        json!({"type": "object", "properties": {"message": {"type": "string"}}}),
        |args: Value| async move {
            let message = args["message"].as_str().unwrap_or("requested failure");
            Err(ToolError::failed("fail", message))
        },
    );

    Ok(ToolRegistry::new().with(echo).with(add).with(fail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_agent::{ToolCall, ToolPipeline};
    use std::io::Write;

    #[tokio::test]
    async fn builtin_add_sums_numbers() {
        let registry = builtin_tools().unwrap();
        let result = ToolPipeline::new()
            .execute_single(&ToolCall::from_value("1", "add", json!({"a": 2, "b": 3.5})), &registry)
            .await;
        assert_eq!(result.result.result_text(), r#"{"sum":5.5}"#);
    }

    #[tokio::test]
    async fn builtin_echo_rejects_missing_text() {
        let registry = builtin_tools().unwrap();
        let result = ToolPipeline::new()
            .execute_single(&ToolCall::from_value("1", "echo", json!({})), &registry)
            .await;
        assert!(!result.is_success());
    }

    #[test]
    fn load_script_reads_turns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"fail": "offline"}}]"#).unwrap();
        assert_eq!(load_script(file.path()).unwrap().remaining(), 1);
    }

    #[test]
    fn missing_config_path_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), OrchestratorConfig::default());
    }
}
