//! Tool orchestrator.
//!
//! Drives one request through the run state machine:
//!
//! ```text
//! AwaitingPlan ──planner picks a tool──▶ Invoking(tool) ──ok──▶ AwaitingPlan
//!      │                                      │
//!      └──planner responds──▶ Done            └──fault──▶ Failed
//! ```
//!
//! Before a tool runs, the planner's invocation must name a registered tool
//! and its arguments must decode to that tool's input kind. Exactly one tool
//! is in flight at a time, and nothing carries over between runs except the
//! shared read-only pieces (contract, registry, artifact locks).

mod locks;
mod state;
mod trace;

pub use locks::{ArtifactGuard, ArtifactLocks};
pub use state::{RunLifecycle, RunState, StateTransition};
pub use trace::{InvocationTrace, TraceEntry, TraceOutcome};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::error::{Failure, FailureKind, ToolError};
use crate::planner::{PlanStep, Planner, PlanningContext, ToolInvocation};
use crate::schema::SchemaContract;
use crate::tools::{RunContext, ToolOutput, ToolRegistry, ToolValue};

/// Successful end of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// The planner's final response, verbatim.
    pub response: String,
    pub trace: InvocationTrace,
    pub transitions: Vec<StateTransition>,
}

/// A run that ended in `Failed`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("run {run_id} failed: {failure}")]
pub struct RunFailure {
    pub run_id: Uuid,
    pub failure: Failure,
    pub trace: InvocationTrace,
    pub transitions: Vec<StateTransition>,
}

/// Sequences planner steps and tool invocations for a request.
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    tools: Arc<ToolRegistry>,
    contract: Arc<SchemaContract>,
    locks: Arc<ArtifactLocks>,
    max_iterations: usize,
    default_artifact: String,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        tools: Arc<ToolRegistry>,
        contract: Arc<SchemaContract>,
    ) -> Self {
        Self {
            planner,
            tools,
            contract,
            locks: Arc::new(ArtifactLocks::new()),
            max_iterations: 10,
            default_artifact: "patient_records".to_string(),
        }
    }

    /// Maximum planner steps per run.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Artifact name used by [`run`](Self::run).
    pub fn with_default_artifact(mut self, name: impl Into<String>) -> Self {
        self.default_artifact = name.into();
        self
    }

    /// Share a lock table with other orchestrators writing the same directory.
    pub fn with_locks(mut self, locks: Arc<ArtifactLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Answer `request`, writing to the default artifact name.
    pub async fn run(&self, request: &str) -> Result<RunOutcome, RunFailure> {
        self.run_with(request, &self.default_artifact).await
    }

    /// Answer `request`, writing to `artifact_name`.
    ///
    /// Runs that share an artifact name are serialized for their whole
    /// duration; runs with distinct names proceed independently.
    pub async fn run_with(
        &self,
        request: &str,
        artifact_name: &str,
    ) -> Result<RunOutcome, RunFailure> {
        let ctx = RunContext::new(artifact_name);
        let mut run = Run::new(ctx.run_id);

        if let Err(e) = ArtifactStore::validate_name(artifact_name) {
            return Err(run.fail(Failure::new(FailureKind::ArtifactFault, e.to_string())));
        }

        let _guard = self.locks.acquire(artifact_name).await;
        tracing::info!(run_id = %ctx.run_id, artifact = artifact_name, "Run started");

        let constraints = self.contract.to_constraints();
        let tools = self.tools.tool_definitions().await;

        for iteration in 1..=self.max_iterations {
            let planning = PlanningContext {
                request,
                constraints: &constraints,
                tools: &tools,
                trace: &run.trace,
            };

            let step = match self.planner.next_step(&planning).await {
                Ok(step) => step,
                Err(e) => {
                    return Err(run.fail(Failure::plan(format!("planner failed: {}", e))));
                }
            };

            match step {
                PlanStep::Respond(response) => {
                    run.advance(RunState::Done, Some("final response".to_string()));
                    tracing::info!(
                        run_id = %ctx.run_id,
                        steps = run.trace.len(),
                        "Run finished"
                    );
                    return Ok(run.finish(response));
                }
                PlanStep::Invoke(invocation) => {
                    tracing::debug!(
                        run_id = %ctx.run_id,
                        iteration,
                        tool = %invocation.tool,
                        "Planner requested tool"
                    );
                    self.invoke(&mut run, invocation, &ctx).await?;
                }
            }
        }

        Err(run.fail(Failure::plan(format!(
            "planner did not finish within {} steps",
            self.max_iterations
        ))))
    }

    /// Check and execute one invocation, recording it in the trace.
    async fn invoke(
        &self,
        run: &mut Run,
        invocation: ToolInvocation,
        ctx: &RunContext,
    ) -> Result<(), RunFailure> {
        let started_at = Utc::now();
        let start = Instant::now();

        let checked = match self.tools.get(&invocation.tool).await {
            Some(tool) => tool
                .input_kind()
                .decode(&invocation.tool, &invocation.arguments)
                .map(|input| (tool, input)),
            None => Err(ToolError::NotFound {
                name: invocation.tool.clone(),
            }),
        };
        let (tool, input) = match checked {
            Ok(checked) => checked,
            Err(e) => {
                let failure = Failure::from(&e);
                run.record(&invocation, started_at, start, TraceOutcome::Failed {
                    failure: failure.clone(),
                });
                return Err(run.fail(failure));
            }
        };

        run.advance(RunState::Invoking(invocation.tool.clone()), None);

        let timeout = tool.execution_timeout();
        let result = match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                name: invocation.tool.clone(),
                timeout,
                kind: tool.timeout_kind(),
            }),
        };

        let output = match result {
            Ok(output) => output,
            Err(e) if !e.kind().is_fatal() => {
                let failure = Failure::from(&e);
                ToolOutput::text(format!("{} failed: {}", invocation.tool, e), start.elapsed())
                    .with_degraded(failure)
            }
            Err(e) => {
                let failure = Failure::from(&e);
                tracing::error!(
                    run_id = %ctx.run_id,
                    tool = %invocation.tool,
                    kind = %failure.kind,
                    "Tool failed: {}",
                    failure.message
                );
                run.record(&invocation, started_at, start, TraceOutcome::Failed {
                    failure: failure.clone(),
                });
                return Err(run.fail(failure));
            }
        };

        if let Some(degraded) = &output.degraded {
            tracing::warn!(
                run_id = %ctx.run_id,
                tool = %invocation.tool,
                "Tool degraded: {}",
                degraded
            );
        }
        tracing::debug!(
            run_id = %ctx.run_id,
            tool = %invocation.tool,
            output = %output.value.as_text(),
            "Tool succeeded"
        );

        run.record(&invocation, started_at, start, TraceOutcome::Succeeded {
            output: output.value,
            degraded: output.degraded,
        });
        run.advance(RunState::AwaitingPlan, None);
        Ok(())
    }
}

/// Mutable state of a single run.
struct Run {
    run_id: Uuid,
    lifecycle: RunLifecycle,
    trace: InvocationTrace,
}

impl Run {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            lifecycle: RunLifecycle::new(),
            trace: InvocationTrace::new(),
        }
    }

    fn advance(&mut self, state: RunState, reason: Option<String>) {
        if let Err(e) = self.lifecycle.transition_to(state, reason) {
            tracing::error!(run_id = %self.run_id, "{}", e);
        }
    }

    fn record(
        &mut self,
        invocation: &ToolInvocation,
        started_at: chrono::DateTime<Utc>,
        start: Instant,
        outcome: TraceOutcome,
    ) {
        let step = self.trace.len() + 1;
        self.trace.push(TraceEntry {
            step,
            call_id: invocation.call_id.clone(),
            tool: invocation.tool.clone(),
            arguments: invocation.arguments.clone(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            outcome,
        });
    }

    fn fail(&mut self, failure: Failure) -> RunFailure {
        self.advance(RunState::Failed, Some(failure.to_string()));
        tracing::warn!(run_id = %self.run_id, kind = %failure.kind, "Run failed: {}", failure.message);
        RunFailure {
            run_id: self.run_id,
            failure,
            trace: std::mem::take(&mut self.trace),
            transitions: self.lifecycle.transitions().to_vec(),
        }
    }

    fn finish(self, response: String) -> RunOutcome {
        RunOutcome {
            run_id: self.run_id,
            response,
            trace: self.trace,
            transitions: self.lifecycle.transitions().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::display::HeadlessSurface;
    use crate::testing::{MemoryStore, ScriptedPlanner, patient_table};
    use crate::tools::{SideEffect, Tool, ValueKind};

    fn orchestrator(planner: ScriptedPlanner, dir: &std::path::Path) -> Orchestrator {
        let contract = Arc::new(SchemaContract::patient_records());
        let table = patient_table(4);
        let tools = ToolRegistry::with_builtin_tools(
            Arc::clone(&contract),
            Arc::new(MemoryStore::new(move |_| Ok(table.clone()))),
            Arc::new(ArtifactStore::new(dir).unwrap()),
            Arc::new(HeadlessSurface),
            Duration::from_secs(5),
        );
        Orchestrator::new(Arc::new(planner), Arc::new(tools), contract)
    }

    fn states(transitions: &[StateTransition]) -> Vec<String> {
        transitions.iter().map(|t| t.to.to_string()).collect()
    }

    #[tokio::test]
    async fn test_immediate_response() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(ScriptedPlanner::new(vec![ScriptedPlanner::respond("hi")]), dir.path());

        let outcome = orch.run("hello").await.unwrap();
        assert_eq!(outcome.response, "hi");
        assert!(outcome.trace.is_empty());
        assert_eq!(states(&outcome.transitions), vec!["done"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_plan_fault() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            ScriptedPlanner::new(vec![ScriptedPlanner::invoke(
                "drop_everything",
                serde_json::json!({}),
            )]),
            dir.path(),
        );

        let failure = orch.run("x").await.unwrap_err();
        assert_eq!(failure.failure.kind, FailureKind::PlanFault);
        assert_eq!(failure.trace.len(), 1);
        assert_eq!(states(&failure.transitions), vec!["failed"]);
    }

    #[tokio::test]
    async fn test_incompatible_input_never_reaches_tool() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            ScriptedPlanner::new(vec![ScriptedPlanner::invoke(
                "execute_sql_query",
                serde_json::json!({"file_path": "patient_records.csv"}),
            )]),
            dir.path(),
        );

        let failure = orch.run("x").await.unwrap_err();
        assert_eq!(failure.failure.kind, FailureKind::PlanFault);
        assert!(!dir.path().join("patient_records.csv").exists());
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let dir = tempfile::tempdir().unwrap();
        let step = ScriptedPlanner::invoke(
            "execute_sql_query",
            serde_json::json!({"query": "SELECT * FROM patient_records"}),
        );
        let orch = orchestrator(
            ScriptedPlanner::new(vec![step.clone(), step.clone(), step]),
            dir.path(),
        )
        .with_max_iterations(2);

        let failure = orch.run("loop").await.unwrap_err();
        assert_eq!(failure.failure.kind, FailureKind::PlanFault);
        assert!(failure.failure.message.contains("2 steps"));
        assert_eq!(failure.trace.len(), 2);
    }

    #[tokio::test]
    async fn test_planner_error_is_plan_fault() {
        let dir = tempfile::tempdir().unwrap();
        // An empty script makes the planner error out.
        let orch = orchestrator(ScriptedPlanner::new(vec![]), dir.path());

        let failure = orch.run("x").await.unwrap_err();
        assert_eq!(failure.failure.kind, FailureKind::PlanFault);
        assert!(failure.failure.message.contains("planner failed"));
    }

    #[tokio::test]
    async fn test_invalid_artifact_name_fails_before_planning() {
        let dir = tempfile::tempdir().unwrap();
        let planner = ScriptedPlanner::new(vec![ScriptedPlanner::respond("never")]);
        let orch = orchestrator(planner, dir.path());

        let failure = orch.run_with("x", "../escape").await.unwrap_err();
        assert_eq!(failure.failure.kind, FailureKind::ArtifactFault);
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time."
        }

        fn input_kind(&self) -> ValueKind {
            ValueKind::Text
        }

        fn output_kind(&self) -> ValueKind {
            ValueKind::Text
        }

        fn side_effects(&self) -> &[SideEffect] {
            &[SideEffect::DataStore]
        }

        fn execution_timeout(&self) -> Duration {
            Duration::from_millis(20)
        }

        async fn execute(&self, _input: ToolValue, _ctx: &RunContext) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolOutput::text("late", Duration::from_secs(5)))
        }
    }

    #[tokio::test]
    async fn test_tool_timeout_is_typed_failure() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool)).await;
        let planner = ScriptedPlanner::new(vec![ScriptedPlanner::invoke(
            "slow",
            serde_json::json!({"text": "go"}),
        )]);
        let orch = Orchestrator::new(
            Arc::new(planner),
            Arc::new(registry),
            Arc::new(SchemaContract::patient_records()),
        );

        let failure = orch.run("x").await.unwrap_err();
        assert_eq!(failure.failure.kind, FailureKind::StoreFault);
        assert!(failure.failure.message.contains("timed out"));
        assert_eq!(
            states(&failure.transitions),
            vec!["invoking(slow)", "failed"]
        );
    }
}
