//! One chat turn against the web UI, as a forward-only state machine.

use gembridge_browser::{Locator, Page};
use gembridge_core::config::{PipelineConfig, SelectorsConfig};
use gembridge_core::{ChatError, ChatErrorKind, Config, Stage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::diagnostics::DiagnosticSink;
use crate::model::resolve_model;
use crate::navigator::Navigator;
use crate::timing::{pause, type_like_human};
use crate::wait::Poller;

/// Tracks the last stage reached; stages are only ever entered in order.
pub struct StageTracker {
    reached: Stage,
    started: Instant,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            reached: Stage::Idle,
            started: Instant::now(),
        }
    }

    pub fn reached(&self) -> Stage {
        self.reached
    }

    /// The stage currently being worked towards.
    pub fn entering(&self) -> Stage {
        self.reached.next().unwrap_or(Stage::Done)
    }

    pub fn advance(&mut self) -> Stage {
        let next = self.entering();
        info!(
            stage = %next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Stage reached"
        );
        self.reached = next;
        next
    }

    pub fn fail(&self, kind: ChatErrorKind, message: impl Into<String>) -> ChatError {
        ChatError::new(kind, self.entering(), message)
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide whether extracted text is an answer.
pub fn classify(text: &str, upstream_error_phrases: &[String]) -> Result<(), ChatErrorKind> {
    let lowered = text.to_lowercase();
    if upstream_error_phrases
        .iter()
        .any(|p| !p.trim().is_empty() && lowered.contains(&p.to_lowercase()))
    {
        return Err(ChatErrorKind::UpstreamInternalError);
    }
    if text.trim().is_empty() {
        return Err(ChatErrorKind::EmptyResponse);
    }
    Ok(())
}

pub struct ChatPipeline {
    selectors: SelectorsConfig,
    settings: PipelineConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl ChatPipeline {
    pub fn new(config: &Config, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            selectors: config.selectors.clone(),
            settings: config.pipeline.clone(),
            sink,
        }
    }

    fn poller(&self, timeout: Duration) -> Poller {
        Poller::new(timeout, self.settings.poll_interval())
    }

    /// Drive one turn: select the model, type, submit, wait out generation, extract.
    pub async fn run(
        &self,
        page: &dyn Page,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<String, ChatError> {
        let mut stages = StageTracker::new();
        let selector_wait = self.poller(self.settings.selector_timeout());
        let sel = &self.selectors;

        // MODEL_SELECTED
        match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(id) => {
                let spec = resolve_model(id)?;
                debug!(model = id, category = %spec.category, keywords = ?spec.keywords, "Resolved model");
                Navigator::new(page, sel, selector_wait, self.settings.settle_delay())
                    .select_model(&spec)
                    .await?;
            }
            None => debug!("No model requested, keeping the current selection"),
        }
        stages.advance();

        // PROMPT_TYPED
        let input = Locator::new(&sel.prompt_input);
        let found = selector_wait.present(page, &input).await.map_err(|e| {
            stages.fail(
                ChatErrorKind::SelectorNotFound,
                format!("prompt input '{}' not found: {}", input.css, e),
            )
        })?;
        page.click_at(&input.css, found[0].index).await.map_err(|e| {
            stages.fail(
                ChatErrorKind::SelectorNotFound,
                format!("cannot focus prompt input: {}", e),
            )
        })?;
        type_like_human(page, prompt, self.settings.typing_delay_ms)
            .await
            .map_err(|e| {
                stages.fail(ChatErrorKind::SelectorNotFound, format!("typing failed: {}", e))
            })?;
        pause(self.settings.pre_submit_delay_ms).await;
        stages.advance();

        // SUBMITTED
        let submit = Locator::new(&sel.submit_button);
        let button = selector_wait.clickable(page, &submit).await.map_err(|e| {
            stages.fail(
                ChatErrorKind::SelectorNotFound,
                format!("submit button '{}' not clickable: {}", submit.css, e),
            )
        })?;
        page.click_at(&submit.css, button.index).await.map_err(|e| {
            stages.fail(
                ChatErrorKind::SelectorNotFound,
                format!("submit click failed: {}", e),
            )
        })?;
        stages.advance();

        // GENERATING
        let marker = Locator::new(&sel.generating_marker);
        if let Err(e) = self
            .poller(self.settings.start_timeout())
            .present(page, &marker)
            .await
        {
            self.sink
                .capture(ChatErrorKind::GenerationNeverStarted, page)
                .await;
            return Err(stages.fail(
                ChatErrorKind::GenerationNeverStarted,
                format!("generating marker never appeared: {}", e),
            ));
        }
        stages.advance();

        // COMPLETED
        if let Err(e) = self
            .poller(self.settings.completion_timeout())
            .gone(page, &marker.css)
            .await
        {
            self.sink
                .capture(ChatErrorKind::GenerationTimedOut, page)
                .await;
            return Err(stages.fail(
                ChatErrorKind::GenerationTimedOut,
                format!("generating marker still visible: {}", e),
            ));
        }
        tokio::time::sleep(self.settings.settle_delay()).await;
        stages.advance();

        // EXTRACTED
        let containers = Locator::new(&sel.response_container);
        let responses = selector_wait.present(page, &containers).await.map_err(|e| {
            stages.fail(
                ChatErrorKind::NoResponseFound,
                format!("no response container '{}': {}", containers.css, e),
            )
        })?;
        let text = responses
            .last()
            .map(|m| m.state.text.trim().to_string())
            .unwrap_or_default();
        stages.advance();

        if let Err(kind) = classify(&text, &self.settings.upstream_error_phrases) {
            if kind == ChatErrorKind::UpstreamInternalError {
                warn!(response = %text, "Web app reported an internal error");
                self.sink.capture(kind, page).await;
            }
            return Err(stages.fail(kind, format!("unusable response: {:?}", truncate(&text, 200))));
        }
        stages.advance();

        info!(chars = text.chars().count(), "Chat turn completed");
        Ok(text)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{Generation, RecordingSink, ScriptedPage};

    fn fixture(page: ScriptedPage) -> (ChatPipeline, ScriptedPage, Arc<RecordingSink>, Config) {
        let config = Config::default();
        let sink = Arc::new(RecordingSink::default());
        (ChatPipeline::new(&config, sink.clone()), page, sink, config)
    }

    fn scripted() -> ScriptedPage {
        ScriptedPage::new(SelectorsConfig::default())
    }

    #[test]
    fn test_stage_tracker_moves_forward_only() {
        let mut stages = StageTracker::new();
        assert_eq!(stages.reached(), Stage::Idle);
        assert_eq!(stages.entering(), Stage::ModelSelected);
        let mut seen = vec![];
        while stages.reached() != Stage::Done {
            seen.push(stages.advance());
        }
        assert_eq!(seen.len(), 7);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(stages.advance(), Stage::Done);
    }

    #[test]
    fn test_classify() {
        let phrases = vec!["internal error has occurred".to_string()];
        assert_eq!(classify("", &phrases), Err(ChatErrorKind::EmptyResponse));
        assert_eq!(classify("  \n ", &phrases), Err(ChatErrorKind::EmptyResponse));
        assert_eq!(
            classify("An Internal Error Has Occurred.", &phrases),
            Err(ChatErrorKind::UpstreamInternalError)
        );
        assert_eq!(classify("Hello there", &phrases), Ok(()));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_with_model() {
        let (pipeline, page, sink, _) = fixture(scripted().with_reply("  Hi! How can I help?\n"));

        let answer = pipeline
            .run(&page, "hello", Some("gemini-2.0-flash"))
            .await
            .unwrap();

        assert_eq!(answer, "Hi! How can I help?");
        assert_eq!(page.selected_model().as_deref(), Some("Gemini 2.0 Flash"));
        assert_eq!(page.submitted_prompts(), vec!["hello"]);
        assert!(sink.kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_submit_pause_precedes_click() {
        let (pipeline, page, _, config) = fixture(scripted());

        pipeline.run(&page, "hi", None).await.unwrap();
        pipeline.run(&page, "again", None).await.unwrap();

        let range = config.pipeline.pre_submit_delay_ms;
        let gaps = page.pre_submit_gaps();
        assert_eq!(gaps.len(), 2);
        for gap in gaps {
            assert!(gap >= Duration::from_millis(range.min), "gap {:?}", gap);
            assert!(gap <= Duration::from_millis(range.max), "gap {:?}", gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_model_skips_selection() {
        let (pipeline, page, _, config) = fixture(scripted());

        pipeline.run(&page, "hello", None).await.unwrap();
        pipeline.run(&page, "again", Some("   ")).await.unwrap();

        assert!(page
            .clicks()
            .iter()
            .all(|c| !c.contains("Gemini") && !c.contains("Gemma")));
        assert_eq!(page.selected_model(), None);
        assert_eq!(page.submitted_prompts(), vec!["hello", "again"]);
        assert_eq!(page.clicked_selectors().first(), Some(&config.selectors.prompt_input));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_model_touches_nothing() {
        let (pipeline, page, _, _) = fixture(scripted());

        let err = pipeline.run(&page, "hello", Some("gpt-4o")).await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::UnresolvedCategory);
        assert!(page.clicks().is_empty());
        assert!(page.submitted_prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_never_started_fails_within_short_bound() {
        let (pipeline, page, sink, config) = fixture(scripted().with_generation(Generation::NeverStarts));
        let start = Instant::now();

        let err = pipeline.run(&page, "hello", None).await.unwrap_err();

        let elapsed = start.elapsed();
        assert_eq!(err.kind, ChatErrorKind::GenerationNeverStarted);
        assert_eq!(err.stage, Stage::Generating);
        assert!(elapsed >= config.pipeline.start_timeout());
        assert!(elapsed < Duration::from_secs(60), "took {:?}", elapsed);
        assert_eq!(sink.kinds(), vec![ChatErrorKind::GenerationNeverStarted]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timed_out_after_long_bound() {
        let (pipeline, page, sink, config) = fixture(scripted().with_generation(Generation::NeverFinishes {
            starts_after: Duration::from_secs(2),
        }));
        let start = Instant::now();

        let err = pipeline.run(&page, "hello", None).await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::GenerationTimedOut);
        assert_eq!(err.stage, Stage::Completed);
        assert!(start.elapsed() >= config.pipeline.completion_timeout());
        assert_eq!(sink.kinds(), vec![ChatErrorKind::GenerationTimedOut]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_generation_within_bound_succeeds() {
        let (pipeline, page, _, _) = fixture(scripted().with_generation(Generation::Normal {
            starts_after: Duration::from_secs(3),
            runs_for: Duration::from_secs(300),
        }));

        let answer = pipeline.run(&page, "write an essay", None).await.unwrap();
        assert_eq!(answer, page.reply());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_is_classified_and_captured() {
        let (pipeline, page, sink, _) =
            fixture(scripted().with_reply("An internal error has occurred. Please retry."));

        let err = pipeline.run(&page, "hello", None).await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::UpstreamInternalError);
        assert_eq!(err.stage, Stage::Done);
        assert_eq!(sink.kinds(), vec![ChatErrorKind::UpstreamInternalError]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response() {
        let (pipeline, page, sink, _) = fixture(scripted().with_reply("   \n  "));

        let err = pipeline.run(&page, "hello", None).await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::EmptyResponse);
        assert!(sink.kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_response_container() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone()).without(&selectors.response_container);
        let (pipeline, page, _, _) = fixture(page);

        let err = pipeline.run(&page, "hello", None).await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::NoResponseFound);
        assert_eq!(err.stage, Stage::Extracted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_prompt_input_fails_at_prompt_stage() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone()).without(&selectors.prompt_input);
        let (pipeline, page, _, _) = fixture(page);

        let err = pipeline.run(&page, "hello", None).await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::SelectorNotFound);
        assert_eq!(err.stage, Stage::PromptTyped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_submit_fails_at_submit_stage() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone()).without(&selectors.submit_button);
        let (pipeline, page, _, _) = fixture(page);

        let err = pipeline.run(&page, "hello", None).await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::SelectorNotFound);
        assert_eq!(err.stage, Stage::Submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_container_wins() {
        let (pipeline, page, _, _) = fixture(scripted());
        pipeline.run(&page, "one", None).await.unwrap();

        page.set_reply("second answer");
        let answer = pipeline.run(&page, "two", None).await.unwrap();

        assert_eq!(answer, "second answer");
    }
}
