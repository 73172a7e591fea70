//! `ask` command: answer one request end to end.

use std::sync::Arc;

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::db::PgStore;
use crate::display::{DisplaySurface, HeadlessSurface, SystemViewer};
use crate::llm::create_llm_provider;
use crate::orchestrator::Orchestrator;
use crate::planner::LlmPlanner;
use crate::schema::SchemaContract;
use crate::tools::ToolRegistry;

/// Wire the pipeline from `config` and run `request` through it.
///
/// Prints the planner's response on success. On failure the structured
/// failure is printed to stderr as JSON and returned as the error.
pub async fn run_ask_command(
    config: Config,
    request: &str,
    artifact: Option<String>,
    no_open: bool,
) -> anyhow::Result<()> {
    let contract = Arc::new(SchemaContract::patient_records());
    let store = Arc::new(PgStore::new(&config.database)?);
    let artifacts = Arc::new(ArtifactStore::new(&config.artifacts.dir)?);

    let surface: Arc<dyn DisplaySurface> = if no_open || !config.artifacts.open_viewer {
        Arc::new(HeadlessSurface)
    } else {
        Arc::new(SystemViewer::new(config.artifacts.display_timeout))
    };

    let tools = Arc::new(ToolRegistry::with_builtin_tools(
        Arc::clone(&contract),
        store,
        artifacts,
        surface,
        config.database.query_timeout,
    ));

    let llm = create_llm_provider(&config.llm)?;
    tracing::info!(model = llm.model_name(), "Using LLM");
    let planner = Arc::new(LlmPlanner::new(llm, config.agent.clone()));

    let orchestrator = Orchestrator::new(planner, tools, contract)
        .with_max_iterations(config.agent.max_tool_iterations)
        .with_default_artifact(config.artifacts.default_name.clone());

    let name = artifact.unwrap_or(config.artifacts.default_name);
    match orchestrator.run_with(request, &name).await {
        Ok(outcome) => {
            tracing::info!(
                run_id = %outcome.run_id,
                steps = outcome.trace.len(),
                "Request answered"
            );
            println!("{}", outcome.response);
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", serde_json::to_string_pretty(&failure.failure)?);
            Err(failure.into())
        }
    }
}
