//! OpenAI-compatible Chat Completions provider.
//!
//! Works against api.openai.com or any endpoint that speaks the same
//! `/v1/chat/completions` protocol with function calling.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, FinishReason, LlmProvider, Role, ToolCall, ToolCompletionRequest,
    ToolCompletionResponse,
};
use crate::retry::{is_retryable_status, retry_backoff_delay};

const PROVIDER: &str = "openai_chat";

/// Chat Completions provider with API key auth.
pub struct OpenAiChatProvider {
    client: Client,
    config: LlmConfig,
}

impl OpenAiChatProvider {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            });
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.config.base_url,
            path.trim_start_matches('/')
        )
    }

    fn api_key(&self) -> String {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default()
    }

    /// POST `body` to chat/completions and decode the reply.
    ///
    /// Transport errors and transient statuses are retried up to
    /// `max_retries` times with jittered backoff.
    async fn send_request<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        body: &T,
    ) -> Result<R, LlmError> {
        let url = self.api_url("chat/completions");
        let mut attempt = 0;

        let text = loop {
            let rejection = match self.post_once(&url, body).await {
                Ok(text) => break text,
                Err(rejection) => rejection,
            };
            if !rejection.transient || attempt >= self.config.max_retries {
                return Err(rejection.error);
            }

            let delay = retry_backoff_delay(attempt);
            attempt += 1;
            tracing::warn!(
                provider = PROVIDER,
                attempt,
                max_retries = self.config.max_retries,
                ?delay,
                "Chat completion rejected, trying again: {}",
                rejection.error
            );
            tokio::time::sleep(delay).await;
        };

        serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("JSON parse error: {}. Raw: {}", e, text),
        })
    }

    /// A single POST; returns the body of a 2xx reply.
    async fn post_once<T: Serialize>(&self, url: &str, body: &T) -> Result<String, Rejection> {
        if tracing::enabled!(tracing::Level::TRACE)
            && let Ok(json) = serde_json::to_string(body)
        {
            tracing::trace!(url, "Chat completion body: {}", json);
        }

        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key())
            .json(body)
            .send()
            .await
            .map_err(|e| Rejection {
                error: LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                },
                transient: true,
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        tracing::debug!(%status, bytes = text.len(), "Chat completion reply");

        if status.is_success() {
            Ok(text)
        } else {
            Err(reject_status(status.as_u16(), &text))
        }
    }
}

/// A failed POST and whether sending it again could help.
#[derive(Debug)]
struct Rejection {
    error: LlmError,
    transient: bool,
}

fn reject_status(status: u16, body: &str) -> Rejection {
    let error = match status {
        401 | 403 => LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        },
        429 => LlmError::RateLimited {
            provider: PROVIDER.to_string(),
        },
        _ => LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("HTTP {}: {}", status, body),
        },
    };
    Rejection {
        error,
        transient: is_retryable_status(status),
    }
}

#[async_trait]
impl LlmProvider for OpenAiChatProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete_with_tools(
        &self,
        req: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let messages: Vec<ChatCompletionMessage> =
            req.messages.into_iter().map(|m| m.into()).collect();

        let tools: Vec<ChatCompletionTool> = req
            .tools
            .into_iter()
            .map(|t| ChatCompletionTool {
                tool_type: "function".to_string(),
                function: ChatCompletionFunction {
                    name: t.name,
                    description: Some(t.description),
                    parameters: Some(t.parameters),
                },
            })
            .collect();

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            tools: if tools.is_empty() { None } else { Some(tools) },
            tool_choice: req.tool_choice,
        };

        let response: ChatCompletionResponse = self.send_request(&request).await?;
        parse_response(response)
    }
}

fn parse_response(response: ChatCompletionResponse) -> Result<ToolCompletionResponse, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "No choices in response".to_string(),
        })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let arguments = serde_json::from_str(&tc.function.arguments).map_err(|e| {
                LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: format!(
                        "arguments for {} are not valid JSON: {}",
                        tc.function.name, e
                    ),
                }
            })?;
            Ok(ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, LlmError>>()?;

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolUse,
        Some("content_filter") => FinishReason::ContentFilter,
        _ if !tool_calls.is_empty() => FinishReason::ToolUse,
        _ => FinishReason::Unknown,
    };

    let usage = response.usage.unwrap_or_default();
    Ok(ToolCompletionResponse {
        content: choice.message.content,
        tool_calls,
        finish_reason,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    })
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatCompletionTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatCompletionToolCall>>,
}

impl From<ChatMessage> for ChatCompletionMessage {
    fn from(msg: ChatMessage) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls = msg.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|tc| ChatCompletionToolCall {
                    id: tc.id,
                    call_type: "function".to_string(),
                    function: ChatCompletionToolCallFunction {
                        name: tc.name,
                        arguments: tc.arguments.to_string(),
                    },
                })
                .collect()
        });

        let content = if tool_calls.is_some() && msg.content.is_empty() {
            None
        } else {
            Some(msg.content)
        };

        Self {
            role,
            content,
            tool_call_id: msg.tool_call_id,
            name: msg.name,
            tool_calls,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatCompletionFunction,
}

#[derive(Debug, Serialize)]
struct ChatCompletionFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatCompletionToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ChatCompletionToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_conversion() {
        let chat_msg: ChatCompletionMessage = ChatMessage::user("Hello").into();
        assert_eq!(chat_msg.role, "user");
        assert_eq!(chat_msg.content, Some("Hello".to_string()));
        assert!(chat_msg.tool_calls.is_none());
    }

    #[test]
    fn test_tool_result_conversion() {
        let msg = ChatMessage::tool_result("call_123", "execute_sql_query", "/tmp/a.csv");
        let chat_msg: ChatCompletionMessage = msg.into();
        assert_eq!(chat_msg.role, "tool");
        assert_eq!(chat_msg.tool_call_id, Some("call_123".to_string()));
        assert_eq!(chat_msg.name, Some("execute_sql_query".to_string()));
    }

    #[test]
    fn test_tool_call_arguments_serialized_to_string() {
        let tc = ToolCall {
            id: "call_1".to_string(),
            name: "execute_sql_query".to_string(),
            arguments: serde_json::json!({"query": "SELECT 1"}),
        };
        let chat_msg: ChatCompletionMessage =
            ChatMessage::assistant_with_tool_calls(None, vec![tc]).into();

        assert!(chat_msg.content.is_none());
        let calls = chat_msg.tool_calls.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(parsed["query"], "SELECT 1");
    }

    #[test]
    fn test_parse_tool_call_response() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {
                            "name": "execute_sql_query",
                            "arguments": "{\"query\": \"SELECT * FROM patient_records\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;

        let response: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.finish_reason, FinishReason::ToolUse);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "execute_sql_query");
        assert_eq!(
            parsed.tool_calls[0].arguments["query"],
            "SELECT * FROM patient_records"
        );
        assert_eq!(parsed.input_tokens, 10);
    }

    #[test]
    fn test_parse_response_without_usage() {
        let raw = r#"{"choices": [{"message": {"content": "done"}, "finish_reason": "stop"}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.content.as_deref(), Some("done"));
        assert_eq!(parsed.finish_reason, FinishReason::Stop);
        assert_eq!(parsed.output_tokens, 0);
    }

    #[test]
    fn test_malformed_arguments_are_rejected() {
        let raw = r#"{"choices": [{"message": {"tool_calls": [{"id": "c", "function": {"name": "x", "arguments": "{not json"}}]}, "finish_reason": "tool_calls"}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            parse_response(response),
            Err(LlmError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_empty_choices_is_invalid() {
        let response: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parse_response(response).is_err());
    }

    #[test]
    fn test_status_rejections() {
        let auth = reject_status(401, "");
        assert!(matches!(auth.error, LlmError::AuthFailed { .. }));
        assert!(!auth.transient);

        let limited = reject_status(429, "slow down");
        assert!(matches!(limited.error, LlmError::RateLimited { .. }));
        assert!(limited.transient);

        let unavailable = reject_status(503, "");
        assert!(unavailable.transient);

        let bad = reject_status(400, "unknown model");
        assert!(!bad.transient);
        match bad.error {
            LlmError::RequestFailed { reason, .. } => assert_eq!(reason, "HTTP 400: unknown model"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_gives_up_after_retries() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: Some(secrecy::SecretString::from("sk-test".to_string())),
            model: "m".to_string(),
            max_retries: 0,
            request_timeout: std::time::Duration::from_secs(2),
        };
        let provider = OpenAiChatProvider::new(config).unwrap();

        let err = provider
            .send_request::<_, serde_json::Value>(&serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }

    #[test]
    fn test_missing_api_key_fails_auth() {
        let config = LlmConfig {
            base_url: "http://localhost:1".to_string(),
            api_key: None,
            model: "m".to_string(),
            max_retries: 0,
            request_timeout: std::time::Duration::from_secs(1),
        };
        assert!(matches!(
            OpenAiChatProvider::new(config),
            Err(LlmError::AuthFailed { .. })
        ));
    }
}
