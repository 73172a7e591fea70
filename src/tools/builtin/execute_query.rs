//! `execute_sql_query`: run a query and materialize the result as a CSV artifact.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::artifact::{AbandonOnDrop, ArtifactStore, CommitGate};
use crate::db::RecordStore;
use crate::error::{ArtifactError, DatabaseError, ToolError};
use crate::schema::SchemaContract;
use crate::tools::tool::{RunContext, SideEffect, Tool, ToolOutput};
use crate::tools::value::{ToolValue, ValueKind};

pub const EXECUTE_SQL_QUERY: &str = "execute_sql_query";

/// Executes a structured query against the record store and writes the
/// result set to the run's artifact.
pub struct ExecuteQueryTool {
    contract: Arc<SchemaContract>,
    store: Arc<dyn RecordStore>,
    artifacts: Arc<ArtifactStore>,
    timeout: Duration,
}

impl ExecuteQueryTool {
    pub fn new(
        contract: Arc<SchemaContract>,
        store: Arc<dyn RecordStore>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            contract,
            store,
            artifacts,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for ExecuteQueryTool {
    fn name(&self) -> &str {
        EXECUTE_SQL_QUERY
    }

    fn description(&self) -> &str {
        "Execute a read-only SQL query against the patient_records table and save the \
         result to a CSV file. Returns the path of the CSV file."
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::StructuredQuery
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::ArtifactRef
    }

    fn side_effects(&self) -> &[SideEffect] {
        &[SideEffect::DataStore, SideEffect::Filesystem]
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.input_kind()
            .parameters_schema("A single SELECT statement over the patient_records table")
    }

    fn execution_timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, input: ToolValue, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let query = input.into_query(self.name())?;

        let set = match self.store.fetch_all(query.as_str()).await {
            Ok(set) => set,
            Err(e @ DatabaseError::UnsupportedType { .. }) => {
                return Err(ToolError::SchemaViolation(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        set.validate(&self.contract)?;

        tracing::debug!(
            run_id = %ctx.run_id,
            rows = set.len(),
            columns = ?set.columns,
            "Query returned"
        );

        // The blocking write outlives this future if it is dropped; the
        // guard makes sure an abandoned write is never published.
        let gate = Arc::new(CommitGate::new());
        let pending = AbandonOnDrop::new(Arc::clone(&gate));

        let artifacts = Arc::clone(&self.artifacts);
        let name = ctx.artifact_name.clone();
        let rows = set.len();
        let written =
            tokio::task::spawn_blocking(move || artifacts.write_gated(&name, &set, &gate))
                .await
                .map_err(|e| ArtifactError::WriteFailed {
                    path: ctx.artifact_name.clone(),
                    reason: format!("write task failed: {}", e),
                })??;
        pending.disarm();

        let reference = written.ok_or_else(|| ArtifactError::WriteFailed {
            path: ctx.artifact_name.clone(),
            reason: "write was abandoned".to_string(),
        })?;

        tracing::info!(
            run_id = %ctx.run_id,
            artifact = %reference,
            rows,
            "Materialized query result"
        );

        Ok(ToolOutput::new(ToolValue::Artifact(reference), start.elapsed()))
    }
}
