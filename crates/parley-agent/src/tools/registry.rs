//! Name-keyed tool registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::llm::types::ToolDefinition;
use crate::tools::Tool;

/// The set of tools available to one run, keyed by name.
///
/// Names are unique: registering a second tool under an existing name
/// replaces the first.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, returning the one it replaced (if any).
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_owned();
        let previous = self.tools.insert(name.clone(), tool);
        if previous.is_some() {
            tracing::warn!(tool = %name, "tool registered twice, replacing earlier definition");
        }
        previous
    }

    /// Builder: register a tool.
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Look a tool up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions of every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use serde_json::{Value, json};

    fn named(name: &str, description: &str) -> FunctionTool {
        FunctionTool::new(name, description, json!({"type": "object"}), |_args: Value| async {
            Ok(Value::Null)
        })
    }

    #[test]
    fn definitions_are_sorted_by_name() {
        let registry = ToolRegistry::new()
            .with(named("zeta", "last"))
            .with(named("alpha", "first"));

        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "alpha");
        assert_eq!(defs[1].name, "zeta");
    }

    #[test]
    fn duplicate_name_replaces_earlier_tool() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(named("echo", "v1"))).is_none());
        let replaced = registry.register(Arc::new(named("echo", "v2")));

        assert_eq!(replaced.map(|t| t.description().to_owned()), Some("v1".into()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().description(), "v2");
    }

    #[test]
    fn lookup_of_unknown_name_is_none() {
        let registry = ToolRegistry::new().with(named("echo", "e"));
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
    }
}
