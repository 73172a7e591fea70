//! LLM integration for the planner.
//!
//! One backend: any OpenAI-compatible chat completions endpoint with
//! function calling.

mod openai_chat;
mod provider;

pub use openai_chat::OpenAiChatProvider;
pub use provider::{
    ChatMessage, FinishReason, LlmProvider, Role, ToolCall, ToolCompletionRequest,
    ToolCompletionResponse, ToolDefinition,
};

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create the configured LLM provider.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    tracing::info!(
        base_url = %config.base_url,
        model = %config.model,
        "Using OpenAI-compatible chat completions"
    );
    Ok(Arc::new(OpenAiChatProvider::new(config.clone())?))
}
