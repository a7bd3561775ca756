//! The serialization point between callers and the one browser session.

use gembridge_core::config::QueuePolicy;
use gembridge_core::{ChatError, ChatErrorKind, Config, Paths, Stage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::diagnostics::{DiagnosticSink, NoopSink, ScreenshotDir};
use crate::model::{resolve_model, ModelSpec};
use crate::pipeline::ChatPipeline;
use crate::session::SessionHandle;

pub struct ChatService {
    session: Arc<SessionHandle>,
    pipeline: Arc<ChatPipeline>,
    /// Held for a whole run; the page is not reentrant.
    run_lock: Arc<Mutex<()>>,
    queue_policy: QueuePolicy,
    ready_timeout: Duration,
}

impl ChatService {
    pub fn new(config: &Config, paths: &Paths, session: Arc<SessionHandle>) -> Self {
        let sink: Arc<dyn DiagnosticSink> = if config.pipeline.screenshots {
            Arc::new(ScreenshotDir::new(paths.diagnostics_dir()))
        } else {
            Arc::new(NoopSink)
        };
        Self::with_sink(config, session, sink)
    }

    pub fn with_sink(
        config: &Config,
        session: Arc<SessionHandle>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            session,
            pipeline: Arc::new(ChatPipeline::new(config, sink)),
            run_lock: Arc::new(Mutex::new(())),
            queue_policy: config.gateway.queue_policy,
            ready_timeout: config.gateway.ready_timeout(),
        }
    }

    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }

    pub fn resolve_model(&self, identifier: &str) -> Result<ModelSpec, ChatError> {
        resolve_model(identifier)
    }

    /// Run one chat turn. Waits for the session, then for exclusive use of it.
    ///
    /// The run itself is a separate task: once it holds the session it reaches
    /// DONE or FAILED even if the caller goes away.
    pub async fn run_chat(&self, prompt: &str, model: Option<&str>) -> Result<String, ChatError> {
        let model = model.map(str::trim).filter(|m| !m.is_empty());
        if let Some(id) = model {
            resolve_model(id)?;
        }

        let page = self.session.await_ready(self.ready_timeout).await?;

        let guard = match self.queue_policy {
            QueuePolicy::Wait => {
                debug!("Waiting for the browser session");
                self.run_lock.clone().lock_owned().await
            }
            QueuePolicy::Reject => self.run_lock.clone().try_lock_owned().map_err(|_| {
                ChatError::new(
                    ChatErrorKind::Busy,
                    Stage::Idle,
                    "another chat turn is using the browser session",
                )
            })?,
        };

        info!(model = model.unwrap_or("(current)"), prompt_chars = prompt.chars().count(), "Starting chat turn");
        let pipeline = Arc::clone(&self.pipeline);
        let prompt = prompt.to_string();
        let model = model.map(str::to_string);
        let run = tokio::spawn(async move {
            let _guard = guard;
            pipeline.run(page.as_ref(), &prompt, model.as_deref()).await
        });

        match run.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(ChatError::not_ready(format!("chat turn was cancelled: {}", e))),
        }
    }
}
