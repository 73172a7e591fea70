//! Display surfaces: where rendered views are shown to the user.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Something that can show a local file to the user.
///
/// Launching is best-effort; callers treat errors as non-fatal.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Open `path` in the user's viewer.
    async fn open(&self, path: &Path) -> Result<(), String>;
}

type Launcher = dyn Fn(&Path) -> std::io::Result<()> + Send + Sync;

/// Opens files with the platform's default viewer.
///
/// The launch runs on the blocking pool and is bounded by `timeout`; a
/// launcher that hangs past it is reported as a failure and left behind.
pub struct SystemViewer {
    timeout: Duration,
    launcher: Arc<Launcher>,
}

impl SystemViewer {
    pub fn new(timeout: Duration) -> Self {
        Self::with_launcher(timeout, |path| open::that(path))
    }

    /// Use `launcher` instead of the platform opener.
    pub fn with_launcher(
        timeout: Duration,
        launcher: impl Fn(&Path) -> std::io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            timeout,
            launcher: Arc::new(launcher),
        }
    }
}

#[async_trait]
impl DisplaySurface for SystemViewer {
    fn name(&self) -> &str {
        "system_viewer"
    }

    async fn open(&self, path: &Path) -> Result<(), String> {
        let target = path.to_path_buf();
        let launcher = Arc::clone(&self.launcher);
        let launch = tokio::task::spawn_blocking(move || launcher(&target));

        match tokio::time::timeout(self.timeout, launch).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(e)) => Err(format!("viewer launch task failed: {}", e)),
            Err(_) => Err(format!("viewer did not start within {:?}", self.timeout)),
        }
    }
}

/// A surface for environments with no display; never opens anything.
pub struct HeadlessSurface;

#[async_trait]
impl DisplaySurface for HeadlessSurface {
    fn name(&self) -> &str {
        "headless"
    }

    async fn open(&self, _path: &Path) -> Result<(), String> {
        Err("no display surface available (headless)".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_headless_always_declines() {
        let err = HeadlessSurface
            .open(Path::new("/tmp/whatever.html"))
            .await
            .unwrap_err();
        assert!(err.contains("headless"));
    }

    #[tokio::test]
    async fn test_viewer_launch_succeeds() {
        let viewer = SystemViewer::with_launcher(Duration::from_secs(1), |_| Ok(()));
        viewer.open(Path::new("/tmp/view.html")).await.unwrap();
    }

    #[tokio::test]
    async fn test_viewer_launch_error_is_reported() {
        let viewer = SystemViewer::with_launcher(Duration::from_secs(1), |_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "xdg-open not found",
            ))
        });
        let err = viewer.open(Path::new("/tmp/view.html")).await.unwrap_err();
        assert_eq!(err, "xdg-open not found");
    }

    #[tokio::test]
    async fn test_hanging_viewer_times_out() {
        let viewer = SystemViewer::with_launcher(Duration::from_millis(50), |_| {
            std::thread::sleep(Duration::from_secs(2));
            Ok(())
        });

        let start = std::time::Instant::now();
        let err = viewer.open(Path::new("/tmp/view.html")).await.unwrap_err();

        assert!(err.contains("did not start within"));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
