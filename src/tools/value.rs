//! Typed values passed between tools.
//!
//! The planner hands the orchestrator raw JSON arguments. Before any tool
//! runs, those arguments are decoded into a [`ToolValue`] of the kind the
//! tool declares as its input; anything that does not decode is a plan
//! fault and never reaches the tool.

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRef;
use crate::error::ToolError;

/// The kinds of value a tool can accept or produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    StructuredQuery,
    ArtifactRef,
    Text,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredQuery => "structured_query",
            Self::ArtifactRef => "artifact_ref",
            Self::Text => "text",
        }
    }

    /// Name of the single JSON argument carrying a value of this kind.
    pub fn argument_name(&self) -> &'static str {
        match self {
            Self::StructuredQuery => "query",
            Self::ArtifactRef => "file_path",
            Self::Text => "text",
        }
    }

    /// JSON schema for an argument object carrying this kind.
    pub fn parameters_schema(&self, description: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                self.argument_name(): {
                    "type": "string",
                    "description": description
                }
            },
            "required": [self.argument_name()]
        })
    }

    /// Decode planner arguments into a value of this kind.
    ///
    /// Accepts either `{"<argument_name>": "..."}` or a bare JSON string.
    pub fn decode(&self, tool: &str, arguments: &serde_json::Value) -> Result<ToolValue, ToolError> {
        let invalid = |reason: String| ToolError::InvalidInput {
            name: tool.to_string(),
            reason,
        };

        let raw = match arguments {
            serde_json::Value::String(s) => s.as_str(),
            serde_json::Value::Object(map) => map
                .get(self.argument_name())
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    invalid(format!(
                        "expected a string '{}' argument ({})",
                        self.argument_name(),
                        self.as_str()
                    ))
                })?,
            other => {
                return Err(invalid(format!(
                    "expected an object with '{}', got {}",
                    self.argument_name(),
                    json_type_name(other)
                )));
            }
        };

        match self {
            Self::StructuredQuery => StructuredQuery::parse(raw)
                .map(ToolValue::Query)
                .map_err(invalid),
            Self::ArtifactRef => {
                if raw.trim().is_empty() {
                    return Err(invalid("artifact reference is empty".to_string()));
                }
                Ok(ToolValue::Artifact(ArtifactRef::new(raw.trim())))
            }
            Self::Text => Ok(ToolValue::Text(raw.to_string())),
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// A value flowing into or out of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolValue {
    Query(StructuredQuery),
    Artifact(ArtifactRef),
    Text(String),
}

impl ToolValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Query(_) => ValueKind::StructuredQuery,
            Self::Artifact(_) => ValueKind::ArtifactRef,
            Self::Text(_) => ValueKind::Text,
        }
    }

    /// The value as plain text, as it is shown to the planner.
    pub fn as_text(&self) -> &str {
        match self {
            Self::Query(q) => q.as_str(),
            Self::Artifact(r) => r.as_str(),
            Self::Text(t) => t,
        }
    }

    pub fn into_query(self, tool: &str) -> Result<StructuredQuery, ToolError> {
        match self {
            Self::Query(q) => Ok(q),
            other => Err(kind_mismatch(tool, ValueKind::StructuredQuery, other.kind())),
        }
    }

    pub fn into_artifact(self, tool: &str) -> Result<ArtifactRef, ToolError> {
        match self {
            Self::Artifact(r) => Ok(r),
            other => Err(kind_mismatch(tool, ValueKind::ArtifactRef, other.kind())),
        }
    }
}

fn kind_mismatch(tool: &str, expected: ValueKind, got: ValueKind) -> ToolError {
    ToolError::InvalidInput {
        name: tool.to_string(),
        reason: format!("expected {}, got {}", expected, got),
    }
}

/// A single read-only SQL statement.
///
/// Only text-level well-formedness is checked here. Which columns the
/// statement projects is checked against the schema contract after it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredQuery {
    query: String,
}

impl StructuredQuery {
    /// Validate and normalize query text.
    ///
    /// The text must be one statement starting with `SELECT` or `WITH`.
    /// Surrounding whitespace and trailing semicolons are dropped.
    pub fn parse(text: &str) -> Result<Self, String> {
        let trimmed = text.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if trimmed.is_empty() {
            return Err("query is empty".to_string());
        }

        if has_statement_separator(trimmed) {
            return Err("query must be a single statement".to_string());
        }

        let keyword: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        if keyword != "SELECT" && keyword != "WITH" {
            return Err(format!(
                "query must be a read-only SELECT statement, got '{}'",
                if keyword.is_empty() { trimmed } else { &keyword }
            ));
        }

        Ok(Self {
            query: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.query
    }
}

impl std::fmt::Display for StructuredQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.query)
    }
}

/// Whether `sql` contains a `;` outside quotes and comments.
fn has_statement_separator(sql: &str) -> bool {
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                ';' => return true,
                '-' if chars.peek() == Some(&'-') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => {}
            },
        }
    }
    false
}
