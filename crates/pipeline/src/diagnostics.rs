//! Failure evidence: screenshots named by failure kind.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use gembridge_browser::Page;
use gembridge_core::ChatErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};

/// Receives a capture request when a chat turn fails. Must never fail the turn.
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    async fn capture(&self, kind: ChatErrorKind, page: &dyn Page);
}

/// Writes `<kind code>_<timestamp>.png` into a directory.
pub struct ScreenshotDir {
    dir: PathBuf,
}

impl ScreenshotDir {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn file_name(kind: ChatErrorKind, at: DateTime<Local>) -> String {
        format!("{}_{}.png", kind.code(), at.format("%Y%m%d_%H%M%S_%3f"))
    }
}

#[async_trait]
impl DiagnosticSink for ScreenshotDir {
    async fn capture(&self, kind: ChatErrorKind, page: &dyn Page) {
        let png = match page.screenshot_png().await {
            Ok(png) => png,
            Err(e) => {
                warn!(kind = kind.code(), "Diagnostic screenshot failed: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), "Cannot create diagnostics dir: {}", e);
            return;
        }
        let path = self.dir.join(Self::file_name(kind, Local::now()));
        match tokio::fs::write(&path, png).await {
            Ok(()) => info!(path = %path.display(), "Saved diagnostic screenshot"),
            Err(e) => warn!(path = %path.display(), "Cannot write diagnostic screenshot: {}", e),
        }
    }
}

pub struct NoopSink;

#[async_trait]
impl DiagnosticSink for NoopSink {
    async fn capture(&self, _kind: ChatErrorKind, _page: &dyn Page) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedPage;
    use chrono::TimeZone;
    use gembridge_core::config::SelectorsConfig;

    #[test]
    fn test_file_name_carries_kind_code() {
        let at = Local.with_ymd_and_hms(2025, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            ScreenshotDir::file_name(ChatErrorKind::GenerationTimedOut, at),
            "generation_timed_out_20250506_070809_000.png"
        );
    }

    #[tokio::test]
    async fn test_screenshot_dir_writes_png() {
        let dir = std::env::temp_dir().join("gembridge_test_diagnostics");
        let _ = std::fs::remove_dir_all(&dir);
        let page = ScriptedPage::new(SelectorsConfig::default());

        ScreenshotDir::new(dir.clone())
            .capture(ChatErrorKind::UpstreamInternalError, &page)
            .await;

        let files: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("upstream_internal_error_"));
        assert_eq!(page.screenshots(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
