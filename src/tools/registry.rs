//! Tool registry for managing available tools.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::artifact::ArtifactStore;
use crate::db::RecordStore;
use crate::display::DisplaySurface;
use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::schema::SchemaContract;
use crate::tools::builtin::{DisplayTool, ExecuteQueryTool};
use crate::tools::tool::Tool;

/// Registry of available tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding `execute_sql_query` and `display_in_browser`.
    pub fn with_builtin_tools(
        contract: Arc<SchemaContract>,
        store: Arc<dyn RecordStore>,
        artifacts: Arc<ArtifactStore>,
        surface: Arc<dyn DisplaySurface>,
        query_timeout: std::time::Duration,
    ) -> Self {
        let registry = Self::new();
        registry.register_sync(Arc::new(
            ExecuteQueryTool::new(Arc::clone(&contract), store, Arc::clone(&artifacts))
                .with_timeout(query_timeout),
        ));
        registry.register_sync(Arc::new(DisplayTool::new(contract, artifacts, surface)));

        tracing::debug!("Registered {} built-in tools", registry.count());
        registry
    }

    /// Register a tool.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().await.insert(name.clone(), tool);
        tracing::debug!("Registered tool: {}", name);
    }

    /// Register a tool (sync version for startup).
    pub fn register_sync(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if let Ok(mut tools) = self.tools.try_write() {
            tools.insert(name.clone(), tool);
            tracing::debug!("Registered tool: {}", name);
        }
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Check if a tool exists.
    pub async fn has(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// List all tool names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.try_read().map(|t| t.len()).unwrap_or(0)
    }

    /// Tool definitions for LLM function calling, sorted by name so the
    /// catalog is identical across runs.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .await
            .values()
            .map(|tool| tool.definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Check that `names` can run in this order: every tool exists and each
    /// tool's output kind is the next tool's input kind.
    pub async fn check_chain(&self, names: &[&str]) -> Result<(), ToolError> {
        let tools = self.tools.read().await;
        let mut previous: Option<&Arc<dyn Tool>> = None;

        for name in names {
            let tool = tools.get(*name).ok_or_else(|| ToolError::NotFound {
                name: name.to_string(),
            })?;
            if let Some(prev) = previous
                && prev.output_kind() != tool.input_kind()
            {
                return Err(ToolError::InvalidInput {
                    name: name.to_string(),
                    reason: format!(
                        "{} produces {} but {} takes {}",
                        prev.name(),
                        prev.output_kind(),
                        tool.name(),
                        tool.input_kind()
                    ),
                });
            }
            previous = Some(tool);
        }
        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
