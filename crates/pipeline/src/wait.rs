//! Bounded polling waits against the page.

use gembridge_browser::{locate, Locator, Match, Page};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// A wait that ran out of time. Carries the last probe error, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitTimeout {
    pub timeout: Duration,
    pub last_error: Option<String>,
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timed out after {:.1}s", self.timeout.as_secs_f64())?;
        if let Some(e) = &self.last_error {
            write!(f, " (last error: {})", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for WaitTimeout {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Poller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Probe until it yields a value. Probe errors count as "not yet".
    ///
    /// A probe still running at the deadline is abandoned; the wait never
    /// outlives `timeout`.
    pub async fn until<T, F, Fut>(&self, mut probe: F) -> Result<T, WaitTimeout>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = gembridge_core::Result<Option<T>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_error = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, probe()).await {
                Ok(Ok(Some(value))) => return Ok(value),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    trace!("Wait probe failed: {}", e);
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    return Err(WaitTimeout {
                        timeout: self.timeout,
                        last_error: Some("probe still pending at the deadline".to_string()),
                    });
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(WaitTimeout {
                    timeout: self.timeout,
                    last_error,
                });
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }

    /// At least one element matches.
    pub async fn present(&self, page: &dyn Page, locator: &Locator) -> Result<Vec<Match>, WaitTimeout> {
        self.until(|| async move {
            let matches = locate(page, locator).await?;
            Ok((!matches.is_empty()).then_some(matches))
        })
        .await
    }

    /// Every matching element that is visible and enabled, once there is at least one.
    pub async fn clickable_matches(
        &self,
        page: &dyn Page,
        locator: &Locator,
    ) -> Result<Vec<Match>, WaitTimeout> {
        self.until(|| async move {
            let clickable: Vec<Match> = locate(page, locator)
                .await?
                .into_iter()
                .filter(|m| m.state.clickable())
                .collect();
            Ok((!clickable.is_empty()).then_some(clickable))
        })
        .await
    }

    /// The first visible, enabled match.
    pub async fn clickable(&self, page: &dyn Page, locator: &Locator) -> Result<Match, WaitTimeout> {
        let mut matches = self.clickable_matches(page, locator).await?;
        Ok(matches.swap_remove(0))
    }

    /// No element matching `css` is visible (absent or hidden).
    pub async fn gone(&self, page: &dyn Page, css: &str) -> Result<(), WaitTimeout> {
        self.until(|| async move {
            let elements = page.query(css).await?;
            Ok((!elements.iter().any(|e| e.visible)).then_some(()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gembridge_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_first_satisfying_probe_short_circuits() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let start = Instant::now();
        let poller = Poller::new(Duration::from_secs(10), Duration::from_millis(200));
        let value = poller
            .until(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n == 3).then_some(n))
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_error() {
        let start = Instant::now();
        let poller = Poller::new(Duration::from_secs(2), Duration::from_millis(300));
        let err = poller
            .until(|| async move { Err::<Option<()>, _>(Error::Browser("detached".into())) })
            .await
            .unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(err.last_error.as_deref(), Some("Browser error: detached"));
        assert!(err.to_string().starts_with("timed out after 2.0s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_satisfied_without_errors() {
        let poller = Poller::new(Duration::from_millis(500), Duration::from_millis(200));
        let err = poller.until(|| async move { Ok(None::<()>) }).await.unwrap_err();
        assert_eq!(err.last_error, None);
        assert_eq!(err.timeout, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_cannot_outlive_the_ceiling() {
        let start = Instant::now();
        let poller = Poller::new(Duration::from_secs(1), Duration::from_millis(200));
        let err = poller
            .until(|| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(None::<()>)
            })
            .await
            .unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(err.timeout, Duration::from_secs(1));
        assert!(err.last_error.unwrap().contains("pending"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_still_probes_once() {
        let poller = Poller::new(Duration::ZERO, Duration::from_millis(200));
        let value = poller.until(|| async move { Ok(Some(7)) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
