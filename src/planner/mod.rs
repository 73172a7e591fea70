//! Query synthesis: deciding the next step of a run.
//!
//! A planner sees the request, the schema constraints, the tool catalog and
//! everything that has happened so far, and either asks for one tool call
//! or ends the run with a response. Its output is untrusted; the
//! orchestrator checks every invocation before anything executes.

mod llm;

pub use llm::LlmPlanner;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::ToolDefinition;
use crate::orchestrator::InvocationTrace;

/// Everything a planner may look at for one step.
#[derive(Debug, Clone, Copy)]
pub struct PlanningContext<'a> {
    pub request: &'a str,
    /// Serialized schema contract.
    pub constraints: &'a str,
    pub tools: &'a [ToolDefinition],
    pub trace: &'a InvocationTrace,
}

/// A tool call proposed by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool: String,
    pub arguments: serde_json::Value,
}

/// What the planner wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    Invoke(ToolInvocation),
    Respond(String),
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn next_step(&self, ctx: &PlanningContext<'_>) -> Result<PlanStep, LlmError>;
}
