//! Tool trait and types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Failure, FailureKind, ToolError};
use crate::llm::ToolDefinition;
use crate::tools::value::{ToolValue, ValueKind};

/// External resource a tool touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Reads from the record store.
    DataStore,
    /// Reads or writes files under the artifact directory.
    Filesystem,
    /// Asks the user's viewer to open something.
    DisplaySurface,
}

/// Request-scoped context handed to every tool in a run.
///
/// This is the only thing tools share within a run besides the value they
/// receive; nothing in it is mutable.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    /// Artifact name this run writes to.
    pub artifact_name: String,
}

impl RunContext {
    pub fn new(artifact_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            artifact_name: artifact_name.into(),
        }
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub value: ToolValue,
    /// Time taken.
    pub duration: Duration,
    /// A non-fatal failure the tool absorbed (e.g. the viewer would not open).
    pub degraded: Option<Failure>,
}

impl ToolOutput {
    pub fn new(value: ToolValue, duration: Duration) -> Self {
        Self {
            value,
            duration,
            degraded: None,
        }
    }

    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self::new(ToolValue::Text(text.into()), duration)
    }

    pub fn with_degraded(mut self, failure: Failure) -> Self {
        self.degraded = Some(failure);
        self
    }
}

/// A named, stateless operation the planner can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Kind of value this tool accepts.
    fn input_kind(&self) -> ValueKind;

    /// Kind of value this tool produces on success.
    fn output_kind(&self) -> ValueKind;

    /// External resources this tool touches.
    fn side_effects(&self) -> &[SideEffect];

    /// JSON Schema for the tool's arguments.
    fn parameters_schema(&self) -> serde_json::Value {
        self.input_kind().parameters_schema(self.description())
    }

    /// Maximum time this tool is allowed to run before the caller gives up.
    /// Default: 60 seconds.
    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// Failure class reported when the tool times out.
    fn timeout_kind(&self) -> FailureKind {
        if self.side_effects().contains(&SideEffect::DataStore) {
            FailureKind::StoreFault
        } else {
            FailureKind::ArtifactFault
        }
    }

    /// Run the tool. `input` has already been checked against
    /// [`input_kind`](Self::input_kind).
    async fn execute(&self, input: ToolValue, ctx: &RunContext) -> Result<ToolOutput, ToolError>;

    /// Definition advertised to the planner.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercases text."
        }

        fn input_kind(&self) -> ValueKind {
            ValueKind::Text
        }

        fn output_kind(&self) -> ValueKind {
            ValueKind::Text
        }

        fn side_effects(&self) -> &[SideEffect] {
            &[]
        }

        async fn execute(
            &self,
            input: ToolValue,
            _ctx: &RunContext,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(
                input.as_text().to_uppercase(),
                Duration::from_millis(1),
            ))
        }
    }

    #[tokio::test]
    async fn test_execute() {
        let out = UpperTool
            .execute(ToolValue::Text("hi".into()), &RunContext::new("a"))
            .await
            .unwrap();
        assert_eq!(out.value, ToolValue::Text("HI".into()));
        assert!(out.degraded.is_none());
    }

    #[test]
    fn test_definition_derives_from_input_kind() {
        let def = UpperTool.definition();
        assert_eq!(def.name, "upper");
        assert_eq!(def.parameters["required"][0], "text");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(UpperTool.execution_timeout(), Duration::from_secs(60));
        assert_eq!(UpperTool.timeout_kind(), FailureKind::ArtifactFault);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunContext::new("a").run_id, RunContext::new("a").run_id);
    }
}
