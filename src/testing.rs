//! In-memory collaborators for tests.
//!
//! Provides:
//! - [`ScriptedPlanner`]: replays a fixed sequence of plan steps
//! - [`ScriptedLlm`]: an LLM provider that replays canned responses
//! - [`MemoryStore`]: a record store answering queries with a closure
//! - [`RecordingSurface`]: a display surface that remembers what it opened
//! - [`patient_table`]: deterministic patient rows in contract order

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::db::RecordStore;
use crate::display::DisplaySurface;
use crate::error::{DatabaseError, LlmError};
use crate::llm::{
    FinishReason, LlmProvider, ToolCall, ToolCompletionRequest, ToolCompletionResponse,
};
use crate::planner::{PlanStep, Planner, PlanningContext, ToolInvocation};
use crate::records::{FieldValue, ResultRecord, ResultSet};
use crate::schema::SchemaContract;
use crate::tools::builtin::{DISPLAY_IN_BROWSER, EXECUTE_SQL_QUERY};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// One entry of a planner script.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return this step as is.
    Step(PlanStep),
    /// Invoke `tool`, passing the previous tool's output as its argument.
    Forward { tool: String },
}

/// A planner that replays a script, one entry per call.
///
/// Errors once the script runs out.
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<Script>>,
    observed: Mutex<Vec<Option<String>>>,
    calls: AtomicUsize,
}

impl ScriptedPlanner {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self::from_script(steps.into_iter().map(Script::Step).collect())
    }

    pub fn from_script(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            observed: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// The usual three steps: run `sql`, display the artifact, respond.
    pub fn query_then_display(sql: &str, response: &str) -> Self {
        Self::from_script(vec![
            Script::Step(Self::invoke(
                EXECUTE_SQL_QUERY,
                serde_json::json!({ "query": sql }),
            )),
            Script::Forward {
                tool: DISPLAY_IN_BROWSER.to_string(),
            },
            Script::Step(Self::respond(response)),
        ])
    }

    pub fn invoke(tool: &str, arguments: serde_json::Value) -> PlanStep {
        PlanStep::Invoke(ToolInvocation {
            call_id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            tool: tool.to_string(),
            arguments,
        })
    }

    pub fn respond(text: &str) -> PlanStep {
        PlanStep::Respond(text.to_string())
    }

    /// Number of times the planner was asked for a step.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// For each call, the latest tool result the planner was shown.
    pub fn observed(&self) -> Vec<Option<String>> {
        lock(&self.observed).clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn next_step(&self, ctx: &PlanningContext<'_>) -> Result<PlanStep, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let last = ctx.trace.last().map(|e| e.result_text());
        lock(&self.observed).push(last.clone());

        let next = lock(&self.script).pop_front();
        match next {
            Some(Script::Step(step)) => Ok(step),
            Some(Script::Forward { tool }) => {
                let input = last.ok_or_else(|| LlmError::InvalidResponse {
                    provider: "scripted".to_string(),
                    reason: format!("nothing to forward to {}", tool),
                })?;
                Ok(Self::invoke(&tool, serde_json::Value::String(input)))
            }
            None => Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "script exhausted".to_string(),
            }),
        }
    }
}

/// An LLM provider that returns canned responses in order and records
/// every request it receives.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<ToolCompletionResponse>>,
    requests: Mutex<Vec<ToolCompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<ToolCompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(content: &str) -> ToolCompletionResponse {
        ToolCompletionResponse {
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            input_tokens: 10,
            output_tokens: 5,
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> ToolCompletionResponse {
        ToolCompletionResponse {
            content: None,
            tool_calls: calls,
            finish_reason: FinishReason::ToolUse,
            input_tokens: 10,
            output_tokens: 5,
        }
    }

    pub fn requests(&self) -> Vec<ToolCompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        lock(&self.requests).push(request);
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed {
                provider: "scripted-model".to_string(),
                reason: "no scripted responses left".to_string(),
            })
    }
}

type QueryHandler = dyn Fn(&str) -> Result<ResultSet, DatabaseError> + Send + Sync;

/// A record store whose answers come from a closure.
pub struct MemoryStore {
    handler: Box<QueryHandler>,
    queries: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new(
        handler: impl Fn(&str) -> Result<ResultSet, DatabaseError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            queries: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every query returns the contract's columns and no rows.
    pub fn empty() -> Self {
        Self::new(|_| Ok(patient_table(0)))
    }

    /// Sleep this long before answering each query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queries received so far.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_all(&self, sql: &str) -> Result<ResultSet, DatabaseError> {
        lock(&self.queries).push(sql.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(sql)
    }
}

/// A display surface that records every path it is asked to open.
#[derive(Default)]
pub struct RecordingSurface {
    opened: Mutex<Vec<PathBuf>>,
    failure: Option<String>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the request, then fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            failure: Some(reason.into()),
        }
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl DisplaySurface for RecordingSurface {
    fn name(&self) -> &str {
        "recording"
    }

    async fn open(&self, path: &Path) -> Result<(), String> {
        lock(&self.opened).push(path.to_path_buf());
        match &self.failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }
}

const SAMPLE_AGES: &[i64] = &[4, 37, 10, 62, 15, 9, 81, 26];

/// `count` patient rows with every contract column, ids starting at 1.
///
/// Ages cycle through a fixed list that includes values on both sides of 10.
pub fn patient_table(count: usize) -> ResultSet {
    let contract = SchemaContract::patient_records();
    let mut set = ResultSet::new(
        contract
            .field_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    );

    for i in 0..count {
        let id = i as i64 + 1;
        set.push(ResultRecord::new(vec![
            FieldValue::Integer(id),
            FieldValue::Text(format!("Patient {}", id)),
            FieldValue::Integer(SAMPLE_AGES[i % SAMPLE_AGES.len()]),
            FieldValue::Text(format!("p-{:04}", id)),
            if i % 3 == 2 {
                FieldValue::Null
            } else {
                FieldValue::Text("Cough, \"mild\" fever".to_string())
            },
            FieldValue::Text(format!("scan_{:03}.dcm", id)),
            FieldValue::Text(format!("/data/images/scan_{:03}.dcm", id)),
        ]));
    }
    set
}

/// Keep only the rows of `table` whose integer `column` satisfies `keep`.
pub fn filter_rows(table: &ResultSet, column: &str, keep: impl Fn(i64) -> bool) -> ResultSet {
    let mut out = ResultSet::new(table.columns.clone());
    if let Some(idx) = table.column_index(column) {
        for record in &table.records {
            if record.values[idx].as_i64().is_some_and(&keep) {
                out.push(record.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::InvocationTrace;

    #[test]
    fn test_patient_table_fits_contract() {
        let table = patient_table(10);
        assert_eq!(table.len(), 10);
        assert!(table.validate(&SchemaContract::patient_records()).is_ok());
    }

    #[test]
    fn test_filter_rows() {
        let table = patient_table(8);
        let older = filter_rows(&table, "age", |age| age > 10);
        assert_eq!(older.len(), 5);
        assert!(
            older
                .column_values("age")
                .unwrap()
                .all(|v| v.as_i64().unwrap() > 10)
        );
    }

    #[tokio::test]
    async fn test_scripted_planner_exhausts() {
        let planner = ScriptedPlanner::new(vec![ScriptedPlanner::respond("one")]);
        let trace = InvocationTrace::new();
        let ctx = PlanningContext {
            request: "r",
            constraints: "",
            tools: &[],
            trace: &trace,
        };

        assert_eq!(
            planner.next_step(&ctx).await.unwrap(),
            PlanStep::Respond("one".into())
        );
        assert!(planner.next_step(&ctx).await.is_err());
        assert_eq!(planner.calls(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_records_queries() {
        let store = MemoryStore::empty();
        let set = store.fetch_all("SELECT 1").await.unwrap();
        assert!(set.is_empty());
        assert_eq!(store.queries(), vec!["SELECT 1"]);
    }
}
