//! The one browser session of the process and its readiness gate.

use gembridge_browser::{Launcher, Page};
use gembridge_core::ChatError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Readiness of the session. Leaves `Starting` exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Ready,
    Failed(String),
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

pub struct SessionHandle {
    state: watch::Sender<SessionState>,
    page: OnceLock<Arc<dyn Page>>,
    started: AtomicBool,
}

impl SessionHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Starting);
        Self {
            state,
            page: OnceLock::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Launch the browser once. Failure is recorded and never retried.
    pub async fn startup(&self, launcher: &dyn Launcher) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Browser session startup already ran; ignoring");
            return;
        }
        info!("Starting browser session");
        match launcher.launch().await {
            Ok(page) => self.mark_ready(page),
            Err(e) => self.mark_failed(e.to_string()),
        }
    }

    /// Run `startup` on a background task.
    pub fn spawn_startup(self: &Arc<Self>, launcher: Arc<dyn Launcher>) -> tokio::task::JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.startup(launcher.as_ref()).await })
    }

    pub fn mark_ready(&self, page: Arc<dyn Page>) {
        if self.page.set(page).is_err() {
            warn!("Browser session already has a page; ignoring");
            return;
        }
        let changed = self.state.send_if_modified(|state| {
            if *state == SessionState::Starting {
                *state = SessionState::Ready;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Browser session ready");
        }
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let changed = self.state.send_if_modified(|state| {
            if *state == SessionState::Starting {
                *state = SessionState::Failed(reason.clone());
                true
            } else {
                false
            }
        });
        if changed {
            error!(reason = %reason, "Browser session failed to start");
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// The page, once the session is ready.
    pub fn page(&self) -> Option<Arc<dyn Page>> {
        match self.state() {
            SessionState::Ready => self.page.get().cloned(),
            _ => None,
        }
    }

    /// Wait (bounded) for `Ready`. A failed session is reported at once.
    pub async fn await_ready(&self, timeout: Duration) -> Result<Arc<dyn Page>, ChatError> {
        let mut rx = self.state.subscribe();
        let wait = async {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    SessionState::Ready => return Ok(()),
                    SessionState::Failed(reason) => {
                        return Err(ChatError::not_ready(format!(
                            "browser session failed to start: {}",
                            reason
                        )))
                    }
                    SessionState::Starting => {}
                }
                if rx.changed().await.is_err() {
                    return Err(ChatError::not_ready("browser session was shut down"));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(())) => self
                .page
                .get()
                .cloned()
                .ok_or_else(|| ChatError::not_ready("browser session has no page")),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ChatError::not_ready(format!(
                "browser session not ready after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{FailingLauncher, ScriptedLauncher, ScriptedPage};
    use gembridge_core::config::SelectorsConfig;
    use gembridge_core::ChatErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_await_ready_times_out_while_starting() {
        let session = SessionHandle::new();
        let err = session
            .await_ready(Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ChatErrorKind::NotReady);
        assert_eq!(session.state(), SessionState::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_ready_wakes_on_ready() {
        let session = Arc::new(SessionHandle::new());
        let page = Arc::new(ScriptedPage::new(SelectorsConfig::default()));
        let handle = session.spawn_startup(Arc::new(ScriptedLauncher::new(page)));
        let ready = session.await_ready(Duration::from_secs(60)).await;
        assert!(ready.is_ok());
        handle.await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.page().is_some());
    }

    #[tokio::test]
    async fn test_failure_is_terminal_and_reported_immediately() {
        let session = SessionHandle::new();
        session.startup(&FailingLauncher("no browser".into())).await;
        assert_eq!(session.state().label(), "failed");

        // A second startup is ignored, the failure stands.
        let page = Arc::new(ScriptedPage::new(SelectorsConfig::default()));
        session.startup(&ScriptedLauncher::new(page)).await;
        assert!(matches!(session.state(), SessionState::Failed(_)));

        let err = session
            .await_ready(Duration::from_secs(3600))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ChatErrorKind::NotReady);
        assert!(err.message.contains("no browser"));
    }

    #[test]
    fn test_state_is_monotonic() {
        let session = SessionHandle::new();
        session.mark_failed("boom");
        let page = Arc::new(ScriptedPage::new(SelectorsConfig::default()));
        session.mark_ready(page);
        assert_eq!(session.state(), SessionState::Failed("boom".into()));
        assert!(session.page().is_none());
    }
}
