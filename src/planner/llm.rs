//! Planner backed by a function-calling chat model.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AgentConfig;
use crate::error::LlmError;
use crate::llm::{ChatMessage, LlmProvider, ToolCall, ToolCompletionRequest};
use crate::planner::{PlanStep, Planner, PlanningContext, ToolInvocation};

/// Asks an LLM for the next step, replaying the run so far as tool-call
/// and tool-result messages.
pub struct LlmPlanner {
    llm: Arc<dyn LlmProvider>,
    agent: AgentConfig,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmProvider>, agent: AgentConfig) -> Self {
        Self { llm, agent }
    }

    fn system_prompt(&self, constraints: &str) -> String {
        format!(
            "You are {name}, a {profile}.\n\
             {goal}\n\n\
             The only table you may query is described below. Use only these columns:\n\
             {constraints}\n\
             To answer a request, call execute_sql_query with a single SELECT statement, \
             then call display_in_browser with the file path it returns. Once the table \
             has been displayed, reply with a short summary and make no further tool calls.",
            name = self.agent.name,
            profile = self.agent.profile,
            goal = self.agent.goal,
            constraints = constraints,
        )
    }

    fn messages(&self, ctx: &PlanningContext<'_>) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt(ctx.constraints)),
            ChatMessage::user(ctx.request),
        ];

        for entry in ctx.trace.entries() {
            messages.push(ChatMessage::assistant_with_tool_calls(
                None,
                vec![ToolCall {
                    id: entry.call_id.clone(),
                    name: entry.tool.clone(),
                    arguments: entry.arguments.clone(),
                }],
            ));
            messages.push(ChatMessage::tool_result(
                &entry.call_id,
                &entry.tool,
                entry.result_text(),
            ));
        }
        messages
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn next_step(&self, ctx: &PlanningContext<'_>) -> Result<PlanStep, LlmError> {
        let request = ToolCompletionRequest::new(self.messages(ctx), ctx.tools.to_vec())
            .with_temperature(0.0)
            .with_tool_choice("auto");

        let response = self.llm.complete_with_tools(request).await?;
        tracing::debug!(
            model = self.llm.model_name(),
            tool_calls = response.tool_calls.len(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Planner step"
        );

        let mut calls = response.tool_calls.into_iter();
        if let Some(call) = calls.next() {
            let dropped = calls.count();
            if dropped > 0 {
                tracing::warn!(
                    tool = %call.name,
                    dropped,
                    "Model requested several tool calls; running only the first"
                );
            }
            return Ok(PlanStep::Invoke(ToolInvocation {
                call_id: call.id,
                tool: call.name,
                arguments: call.arguments,
            }));
        }

        match response.content {
            Some(text) if !text.trim().is_empty() => Ok(PlanStep::Respond(text)),
            _ => Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "response had neither tool calls nor text".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactRef;
    use crate::llm::{Role, ToolCompletionResponse};
    use crate::orchestrator::{InvocationTrace, TraceEntry, TraceOutcome};
    use crate::schema::SchemaContract;
    use crate::testing::ScriptedLlm;
    use crate::tools::ToolValue;

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn test_first_tool_call_wins() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::tool_calls(vec![
            call("c1", "execute_sql_query", serde_json::json!({"query": "SELECT 1"})),
            call("c2", "display_in_browser", serde_json::json!({"file_path": "x"})),
        ])]));
        let planner = LlmPlanner::new(llm, AgentConfig::default());
        let trace = InvocationTrace::new();
        let ctx = PlanningContext {
            request: "everything",
            constraints: "",
            tools: &[],
            trace: &trace,
        };

        let step = planner.next_step(&ctx).await.unwrap();
        assert_eq!(
            step,
            PlanStep::Invoke(ToolInvocation {
                call_id: "c1".into(),
                tool: "execute_sql_query".into(),
                arguments: serde_json::json!({"query": "SELECT 1"}),
            })
        );
    }

    #[tokio::test]
    async fn test_text_response_ends_run() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text("All done.")]));
        let planner = LlmPlanner::new(llm, AgentConfig::default());
        let trace = InvocationTrace::new();
        let ctx = PlanningContext {
            request: "r",
            constraints: "",
            tools: &[],
            trace: &trace,
        };

        assert_eq!(
            planner.next_step(&ctx).await.unwrap(),
            PlanStep::Respond("All done.".into())
        );
    }

    #[tokio::test]
    async fn test_empty_response_is_an_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![ToolCompletionResponse {
            content: Some("   ".into()),
            tool_calls: vec![],
            finish_reason: crate::llm::FinishReason::Stop,
            input_tokens: 0,
            output_tokens: 0,
        }]));
        let planner = LlmPlanner::new(llm, AgentConfig::default());
        let trace = InvocationTrace::new();
        let ctx = PlanningContext {
            request: "r",
            constraints: "",
            tools: &[],
            trace: &trace,
        };

        assert!(matches!(
            planner.next_step(&ctx).await,
            Err(LlmError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_prompt_carries_constraints_and_trace() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text("ok")]));
        let planner = LlmPlanner::new(llm.clone(), AgentConfig::default());
        let constraints = SchemaContract::patient_records().to_constraints();

        let mut trace = InvocationTrace::new();
        trace.push(TraceEntry {
            step: 1,
            call_id: "c1".into(),
            tool: "execute_sql_query".into(),
            arguments: serde_json::json!({"query": "SELECT * FROM patient_records"}),
            started_at: chrono::Utc::now(),
            duration_ms: 3,
            outcome: TraceOutcome::Succeeded {
                output: ToolValue::Artifact(ArtifactRef::new("/tmp/patient_records.csv")),
                degraded: None,
            },
        });

        let ctx = PlanningContext {
            request: "Show records with age greater than 10",
            constraints: &constraints,
            tools: &[],
            trace: &trace,
        };
        planner.next_step(&ctx).await.unwrap();

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("HealthQueryAgent"));
        assert!(messages[0].content.contains("patient_id"));
        assert_eq!(messages[1].content, "Show records with age greater than 10");
        assert_eq!(messages[2].tool_calls.as_ref().unwrap()[0].id, "c1");
        assert_eq!(messages[3].role, Role::Tool);
        assert_eq!(messages[3].content, "/tmp/patient_records.csv");
    }
}
