//! Invocation trace: what each tool was asked and what it returned.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Failure;
use crate::tools::ToolValue;

/// How one invocation ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceOutcome {
    Succeeded {
        output: ToolValue,
        /// Non-fatal failure the tool absorbed.
        #[serde(skip_serializing_if = "Option::is_none")]
        degraded: Option<Failure>,
    },
    Failed {
        failure: Failure,
    },
}

/// One tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    /// Position in the run, starting at 1.
    pub step: usize,
    /// Planner's id for the call, echoed back with the result.
    pub call_id: String,
    pub tool: String,
    /// Arguments exactly as the planner sent them.
    pub arguments: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: TraceOutcome,
}

impl TraceEntry {
    /// Text handed back to the planner for this invocation.
    pub fn result_text(&self) -> String {
        match &self.outcome {
            TraceOutcome::Succeeded { output, .. } => output.as_text().to_string(),
            TraceOutcome::Failed { failure } => format!("Error: {}", failure),
        }
    }
}

/// Ordered record of a run's tool invocations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InvocationTrace {
    entries: Vec<TraceEntry>,
}

impl InvocationTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    /// Last successful output of `tool`, if any.
    pub fn last_output_of(&self, tool: &str) -> Option<&ToolValue> {
        self.entries.iter().rev().find_map(|e| match &e.outcome {
            TraceOutcome::Succeeded { output, .. } if e.tool == tool => Some(output),
            _ => None,
        })
    }
}
