//! Tool argument validation.
//!
//! The pipeline treats schemas as opaque: it only asks a tool for a
//! [`SchemaValidator`] and reports a failed check as an invocation error.
//! [`JsonSchemaValidator`] is the stock implementation.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// Checks tool arguments before invocation.
pub trait SchemaValidator: Send + Sync {
    /// Returns a human-readable reason when `instance` is rejected.
    fn validate(&self, instance: &Value) -> std::result::Result<(), String>;
}

/// A compiled JSON Schema (draft 7).
pub struct JsonSchemaValidator {
    schema: JSONSchema,
}

impl JsonSchemaValidator {
    /// Compile `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Validation`] if the schema itself is invalid.
    pub fn compile(schema: &Value) -> Result<Self> {
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| AgentError::Validation {
                reason: format!("failed to compile tool schema: {e}"),
            })?;

        Ok(Self { schema })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, instance: &Value) -> std::result::Result<(), String> {
        self.schema.validate(instance).map_err(|errors| {
            errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect::<Vec<_>>()
                .join(", ")
        })
    }
}

impl std::fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}
