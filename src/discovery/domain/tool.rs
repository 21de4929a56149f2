//! Tool descriptor value object.

use super::InvalidToolError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tools declared by one server, keyed by tool name in declaration order.
pub type ToolSet = IndexMap<String, ToolDescriptor>;

/// One capability exposed by a server.
///
/// The schema payload is the listing entry exactly as the server sent it
/// (parameter shape, description and any extra fields). It is passed
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    name: String,
    schema: Value,
}

impl ToolDescriptor {
    /// Builds a descriptor from one entry of a `tools/list` result.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidToolError`] when the entry is not an object or has
    /// no non-blank string `name`. The name is kept exactly as declared.
    pub fn from_listing(entry: Value) -> Result<Self, InvalidToolError> {
        let name = entry
            .as_object()
            .ok_or(InvalidToolError::NotAnObject)?
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .ok_or(InvalidToolError::MissingName)?
            .to_owned();

        Ok(Self {
            name,
            schema: entry,
        })
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the opaque schema payload.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns the human description, when the server supplied one.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.schema.get("description").and_then(Value::as_str)
    }

    /// Consumes the descriptor and returns its schema payload.
    #[must_use]
    pub fn into_schema(self) -> Value {
        self.schema
    }
}
