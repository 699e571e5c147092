//! Orchestrator configuration.
//!
//! Settings can be built in code, or loaded from a TOML or JSON file (the
//! format is chosen by extension, TOML being the default).  Every field has
//! a default, so a file only needs the keys it changes:
//!
//! ```toml
//! max_iterations = 10
//! tool_timeout_secs = 30
//!
//! [options]
//! model = "claude-sonnet"
//! temperature = 0.2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AgentError, Result};
use crate::llm::types::ChatOptions;
use crate::tools::PipelineConfig;

/// Default cap on model invocations per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

/// Default number of empty model turns tolerated after tool results.
pub const DEFAULT_EMPTY_CONTINUATION_BUDGET: u32 = 1;

/// Settings for one orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of model invocations in one run.
    pub max_iterations: u32,

    /// How many consecutive empty model turns following tool results are
    /// treated as "continue" before the run ends.
    pub empty_continuation_budget: u32,

    /// Start the text of a later model turn on a new line when an earlier
    /// turn of the same run already produced text.
    pub prefix_text_between_turns: bool,

    /// Per-call tool timeout in seconds.  Absent means no limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_timeout_secs: Option<u64>,

    /// Generation options forwarded to the provider.
    pub options: ChatOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            empty_continuation_budget: DEFAULT_EMPTY_CONTINUATION_BUDGET,
            prefix_text_between_turns: true,
            tool_timeout_secs: None,
            options: ChatOptions::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| AgentError::Config {
            reason: format!("failed to parse TOML config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| AgentError::Config {
            reason: format!("failed to parse JSON config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file.  `.json` files are parsed as JSON, anything else
    /// as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };

        info!(
            path = %path.display(),
            max_iterations = config.max_iterations,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config {
                reason: "max_iterations must be at least 1".into(),
            });
        }
        if let Some(temperature) = self.options.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(AgentError::Config {
                    reason: format!("temperature {temperature} is outside 0.0..=2.0"),
                });
            }
        }
        debug!(config = ?self, "configuration validated");
        Ok(())
    }

    /// Tool timeout as a duration.
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    /// Settings for the tool pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            tool_timeout: self.tool_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = OrchestratorConfig::from_toml_str("max_iterations = 5").unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.empty_continuation_budget, DEFAULT_EMPTY_CONTINUATION_BUDGET);
        assert!(config.prefix_text_between_turns);
        assert!(config.tool_timeout().is_none());
        assert_eq!(config.options, ChatOptions::default());
    }

    #[test]
    fn parses_nested_options_from_toml() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            tool_timeout_secs = 30
            empty_continuation_budget = 2

            [options]
            model = "m-large"
            temperature = 0.2
            max_tokens = 512
            "#,
        )
        .unwrap();

        assert_eq!(config.tool_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.pipeline_config().tool_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.empty_continuation_budget, 2);
        assert_eq!(config.options.model.as_deref(), Some("m-large"));
        assert_eq!(config.options.max_tokens, Some(512));
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let err = OrchestratorConfig::from_json_str(r#"{"max_iterations": 0}"#).unwrap_err();
        assert!(matches!(err, AgentError::Config { .. }));
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let err = OrchestratorConfig::from_toml_str("[options]\ntemperature = 3.5").unwrap_err();
        assert!(matches!(err, AgentError::Config { .. }));
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = OrchestratorConfig::from_toml_str("max_iterations = \"many\"").unwrap_err();
        assert!(matches!(err, AgentError::Config { .. }));
    }

    #[test]
    fn load_picks_format_by_extension() {
        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"max_iterations": 7, "options": {{"model": "x"}}}}"#).unwrap();
        let config = OrchestratorConfig::load(json.path()).unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.options.model.as_deref(), Some("x"));

        let mut toml_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(toml_file, "max_iterations = 3").unwrap();
        assert_eq!(OrchestratorConfig::load(toml_file.path()).unwrap().max_iterations, 3);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OrchestratorConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, AgentError::Config { .. }));
    }
}
