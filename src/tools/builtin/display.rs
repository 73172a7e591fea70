//! `display_in_browser`: render a CSV artifact as HTML and show it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::artifact::{ArtifactRef, ArtifactStore};
use crate::display::DisplaySurface;
use crate::error::{ArtifactError, Failure, FailureKind, ToolError};
use crate::schema::SchemaContract;
use crate::tools::tool::{RunContext, SideEffect, Tool, ToolOutput};
use crate::tools::value::{ToolValue, ValueKind};

pub const DISPLAY_IN_BROWSER: &str = "display_in_browser";

/// An HTML document rendered from an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedView {
    pub document: PathBuf,
    /// Name of the surface that opened the document, if one did.
    pub surfaced: Option<String>,
    /// Why the surface did not open it.
    pub declined: Option<String>,
}

impl RenderedView {
    /// The tool result reported for this view.
    ///
    /// A declined view is still a success, carrying a `DisplayFault`.
    fn into_output(self, reference: &ArtifactRef, elapsed: Duration) -> ToolOutput {
        match self.declined {
            None => ToolOutput::text(
                format!("Table displayed in the browser from the file: {}", reference),
                elapsed,
            ),
            Some(reason) => {
                let notice = format!(
                    "Table rendered to {} from the file: {}; could not open viewer: {}",
                    self.document.display(),
                    reference,
                    reason
                );
                ToolOutput::text(notice, elapsed)
                    .with_degraded(Failure::new(FailureKind::DisplayFault, reason))
            }
        }
    }
}

/// Renders an artifact and asks the display surface to open the result.
///
/// A surface that fails to open is not an error: the tool reports where
/// the rendered document was written instead.
pub struct DisplayTool {
    contract: Arc<SchemaContract>,
    artifacts: Arc<ArtifactStore>,
    surface: Arc<dyn DisplaySurface>,
}

impl DisplayTool {
    pub fn new(
        contract: Arc<SchemaContract>,
        artifacts: Arc<ArtifactStore>,
        surface: Arc<dyn DisplaySurface>,
    ) -> Self {
        Self {
            contract,
            artifacts,
            surface,
        }
    }

    /// Read the artifact back and write its HTML view.
    async fn render(&self, reference: &ArtifactRef) -> Result<PathBuf, ArtifactError> {
        let artifacts = Arc::clone(&self.artifacts);
        let contract = Arc::clone(&self.contract);
        let reference = reference.clone();

        tokio::task::spawn_blocking(move || {
            let set = artifacts.read(&reference, &contract)?;
            artifacts.write_view(&reference, &set)
        })
        .await
        .map_err(|e| ArtifactError::WriteFailed {
            path: self.artifacts.root().display().to_string(),
            reason: format!("render task failed: {}", e),
        })?
    }

    /// Render the artifact and try to open it on the surface.
    ///
    /// Only rendering can fail; a surface that will not open the document
    /// is recorded in the returned view.
    pub async fn present(
        &self,
        reference: &ArtifactRef,
        ctx: &RunContext,
    ) -> Result<RenderedView, ArtifactError> {
        let document = self.render(reference).await?;

        match self.surface.open(&document).await {
            Ok(()) => {
                tracing::info!(
                    run_id = %ctx.run_id,
                    view = %document.display(),
                    surface = self.surface.name(),
                    "Opened rendered view"
                );
                Ok(RenderedView {
                    document,
                    surfaced: Some(self.surface.name().to_string()),
                    declined: None,
                })
            }
            Err(reason) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    view = %document.display(),
                    surface = self.surface.name(),
                    "Could not open viewer: {}",
                    reason
                );
                Ok(RenderedView {
                    document,
                    surfaced: None,
                    declined: Some(reason),
                })
            }
        }
    }
}

#[async_trait]
impl Tool for DisplayTool {
    fn name(&self) -> &str {
        DISPLAY_IN_BROWSER
    }

    fn description(&self) -> &str {
        "Display the content of a CSV file as an HTML table in the browser."
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::ArtifactRef
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn side_effects(&self) -> &[SideEffect] {
        &[SideEffect::Filesystem, SideEffect::DisplaySurface]
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.input_kind()
            .parameters_schema("Path of the CSV file returned by execute_sql_query")
    }

    async fn execute(&self, input: ToolValue, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let reference = input.into_artifact(self.name())?;

        let view = self.present(&reference, ctx).await?;
        Ok(view.into_output(&reference, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{HeadlessSurface, SystemViewer};
    use crate::testing::{RecordingSurface, patient_table};

    fn setup(surface: Arc<dyn DisplaySurface>) -> (tempfile::TempDir, DisplayTool, ArtifactRef) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::new(dir.path()).unwrap());
        let reference = artifacts.write("patient_records", &patient_table(3)).unwrap();
        let tool = DisplayTool::new(
            Arc::new(SchemaContract::patient_records()),
            artifacts,
            surface,
        );
        (dir, tool, reference)
    }

    #[tokio::test]
    async fn test_renders_and_opens() {
        let surface = Arc::new(RecordingSurface::new());
        let (dir, tool, reference) = setup(surface.clone());

        let out = tool
            .execute(ToolValue::Artifact(reference.clone()), &RunContext::new("x"))
            .await
            .unwrap();

        assert_eq!(
            out.value.as_text(),
            format!("Table displayed in the browser from the file: {}", reference)
        );
        assert!(out.degraded.is_none());

        let opened = surface.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0], dir.path().join("patient_records.html"));
        let html = std::fs::read_to_string(&opened[0]).unwrap();
        assert!(html.contains("<table"));
    }

    #[tokio::test]
    async fn test_headless_degrades_to_notice() {
        let (dir, tool, reference) = setup(Arc::new(HeadlessSurface));

        let out = tool
            .execute(ToolValue::Artifact(reference), &RunContext::new("x"))
            .await
            .unwrap();

        let text = out.value.as_text();
        assert!(text.starts_with("Table rendered to "));
        assert!(text.contains("could not open viewer"));
        assert_eq!(out.degraded.unwrap().kind, FailureKind::DisplayFault);
        assert!(dir.path().join("patient_records.html").exists());
    }

    #[tokio::test]
    async fn test_present_records_surface() {
        let surface = Arc::new(RecordingSurface::new());
        let (dir, tool, reference) = setup(surface);

        let view = tool.present(&reference, &RunContext::new("x")).await.unwrap();

        assert_eq!(
            view,
            RenderedView {
                document: dir.path().join("patient_records.html"),
                surfaced: Some("recording".to_string()),
                declined: None,
            }
        );
    }

    #[tokio::test]
    async fn test_present_records_declined_surface() {
        let surface = Arc::new(RecordingSurface::failing("no browser installed"));
        let (_dir, tool, reference) = setup(surface.clone());

        let view = tool.present(&reference, &RunContext::new("x")).await.unwrap();

        assert_eq!(view.surfaced, None);
        assert_eq!(view.declined.as_deref(), Some("no browser installed"));
        assert_eq!(surface.opened(), vec![view.document.clone()]);
    }

    #[tokio::test]
    async fn test_hanging_viewer_degrades_to_notice() {
        let viewer = SystemViewer::with_launcher(Duration::from_millis(50), |_| {
            std::thread::sleep(Duration::from_secs(2));
            Ok(())
        });
        let (dir, tool, reference) = setup(Arc::new(viewer));

        let out = tool
            .execute(ToolValue::Artifact(reference), &RunContext::new("x"))
            .await
            .unwrap();

        let text = out.value.as_text();
        assert!(text.starts_with("Table rendered to "));
        assert!(text.contains("could not open viewer: viewer did not start within"));
        let degraded = out.degraded.unwrap();
        assert_eq!(degraded.kind, FailureKind::DisplayFault);
        assert!(dir.path().join("patient_records.html").exists());
    }

    #[tokio::test]
    async fn test_missing_artifact_never_launches_viewer() {
        let surface = Arc::new(RecordingSurface::new());
        let (dir, tool, _) = setup(surface.clone());
        let missing = ArtifactRef::new(dir.path().join("nope.csv").display().to_string());

        let err = tool
            .execute(ToolValue::Artifact(missing), &RunContext::new("x"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::ArtifactFault);
        assert!(surface.opened().is_empty());
    }

    #[tokio::test]
    async fn test_reference_outside_root_is_artifact_fault() {
        let surface = Arc::new(RecordingSurface::new());
        let (_dir, tool, _) = setup(surface.clone());

        let err = tool
            .execute(
                ToolValue::Artifact(ArtifactRef::new("../../etc/passwd")),
                &RunContext::new("x"),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::ArtifactFault);
        assert!(surface.opened().is_empty());
    }
}
