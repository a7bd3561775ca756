//! Model picker navigation: open the picker, pick the category, pick the option.

use gembridge_browser::{Locator, Match, Page};
use gembridge_core::config::SelectorsConfig;
use gembridge_core::{ChatError, ChatErrorKind, Stage};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::model::ModelSpec;
use crate::wait::Poller;

pub struct Navigator<'a> {
    page: &'a dyn Page,
    selectors: &'a SelectorsConfig,
    poller: Poller,
    settle: Duration,
}

impl<'a> Navigator<'a> {
    pub fn new(
        page: &'a dyn Page,
        selectors: &'a SelectorsConfig,
        poller: Poller,
        settle: Duration,
    ) -> Self {
        Self {
            page,
            selectors,
            poller,
            settle,
        }
    }

    /// Select the option `spec` describes. Returns the first text line of the chosen option.
    ///
    /// Any failure dismisses the picker before it is returned.
    pub async fn select_model(&self, spec: &ModelSpec) -> Result<String, ChatError> {
        let result = self.select_steps(spec).await;
        if let Err(e) = &result {
            warn!(kind = e.kind.code(), "Model selection failed, dismissing picker");
            self.dismiss().await;
        }
        result
    }

    async fn select_steps(&self, spec: &ModelSpec) -> Result<String, ChatError> {
        let opener = Locator::new(&self.selectors.model_selector);
        self.click_when_ready(&opener, ChatErrorKind::SelectorNotFound, "model selector")
            .await?;

        let category = Locator::new(&self.selectors.model_category).with_text(spec.category.label());
        self.click_when_ready(&category, ChatErrorKind::CategoryNotFound, spec.category.label())
            .await?;

        let option = spec
            .keywords
            .iter()
            .fold(Locator::new(&self.selectors.model_option), |loc, kw| {
                loc.with_text(kw.as_str())
            });
        let candidates = self
            .poller
            .clickable_matches(self.page, &option)
            .await
            .map_err(|e| {
                fail(
                    ChatErrorKind::ModelOptionNotFound,
                    format!(
                        "no option under {} contains {:?}: {}",
                        spec.category, spec.keywords, e
                    ),
                )
            })?;
        let chosen = pick_option(spec, &candidates)?;
        let name = first_line(&chosen.state.text);
        debug!(option = %name, index = chosen.index, "Clicking model option");
        self.page
            .click_at(&option.css, chosen.index)
            .await
            .map_err(|e| fail(ChatErrorKind::ModelOptionNotFound, format!("click on '{}' failed: {}", name, e)))?;
        tokio::time::sleep(self.settle).await;

        info!(category = %spec.category, option = %name, "Model option selected");
        Ok(name)
    }

    async fn click_when_ready(
        &self,
        locator: &Locator,
        kind: ChatErrorKind,
        what: &str,
    ) -> Result<(), ChatError> {
        let target = self
            .poller
            .clickable(self.page, locator)
            .await
            .map_err(|e| fail(kind, format!("{} ('{}') not clickable: {}", what, locator.css, e)))?;
        self.page
            .click_at(&locator.css, target.index)
            .await
            .map_err(|e| fail(kind, format!("click on {} failed: {}", what, e)))?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Close any open overlay. Best effort.
    async fn dismiss(&self) {
        if let Err(e) = self.page.press_key("Escape").await {
            debug!("Dismissing the model picker failed: {}", e);
        }
    }
}

fn fail(kind: ChatErrorKind, message: String) -> ChatError {
    ChatError::new(kind, Stage::ModelSelected, message)
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn word_set<'s>(words: impl Iterator<Item = &'s str>, ignore: &[String]) -> BTreeSet<String> {
    words
        .flat_map(|w| w.split('-'))
        .map(str::to_lowercase)
        .filter(|w| !w.is_empty() && !ignore.contains(w))
        .collect()
}

/// Choose among options that contain every keyword.
///
/// A single candidate wins outright. Among several, the one whose first line,
/// less the category words, is exactly the keyword set wins; anything else is
/// ambiguous.
pub fn pick_option<'m>(spec: &ModelSpec, candidates: &'m [Match]) -> Result<&'m Match, ChatError> {
    match candidates {
        [] => Err(fail(
            ChatErrorKind::ModelOptionNotFound,
            format!("no option contains {:?}", spec.keywords),
        )),
        [only] => Ok(only),
        _ => {
            let label_words = spec.category.label_words();
            let wanted = word_set(spec.keywords.iter().map(String::as_str), &label_words);
            let exact: Vec<&Match> = candidates
                .iter()
                .filter(|m| {
                    word_set(first_line(&m.state.text).split_whitespace(), &label_words) == wanted
                })
                .collect();
            match exact.as_slice() {
                [one] => Ok(*one),
                _ => {
                    let names: Vec<String> =
                        candidates.iter().map(|m| first_line(&m.state.text)).collect();
                    Err(fail(
                        ChatErrorKind::AmbiguousModelOption,
                        format!(
                            "{} options match {:?} and none uniquely: {}",
                            candidates.len(),
                            spec.keywords,
                            names.join(", ")
                        ),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::resolve_model;
    use crate::testkit::ScriptedPage;
    use gembridge_browser::ElementState;

    fn option(index: usize, text: &str) -> Match {
        Match {
            index,
            state: ElementState {
                text: text.to_string(),
                visible: true,
                enabled: true,
            },
        }
    }

    fn navigator<'a>(page: &'a ScriptedPage, selectors: &'a SelectorsConfig) -> Navigator<'a> {
        Navigator::new(
            page,
            selectors,
            Poller::new(Duration::from_secs(15), Duration::from_millis(200)),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_pick_prefers_unique_exact_match() {
        let spec = resolve_model("gemini-2.0-flash").unwrap();
        let candidates = [option(0, "Gemini 2.0 Flash-Lite"), option(1, "Gemini 2.0 Flash\ngemini-2.0-flash-001")];
        assert_eq!(pick_option(&spec, &candidates).unwrap().index, 1);
    }

    #[test]
    fn test_pick_ambiguous_without_exact_match() {
        let spec = resolve_model("gemini-2.5-pro-preview").unwrap();
        let candidates = [
            option(0, "Gemini 2.5 Pro Preview 05-06"),
            option(1, "Gemini 2.5 Pro Preview 03-25"),
        ];
        let err = pick_option(&spec, &candidates).unwrap_err();
        assert_eq!(err.kind, ChatErrorKind::AmbiguousModelOption);
        assert!(err.message.contains("03-25"));
    }

    #[test]
    fn test_pick_single_candidate_needs_no_exact_match() {
        let spec = resolve_model("gemini-2.5-pro-preview").unwrap();
        let candidates = [option(4, "Gemini 2.5 Pro Preview 05-06")];
        assert_eq!(pick_option(&spec, &candidates).unwrap().index, 4);
    }

    #[test]
    fn test_gemma_keyword_ignores_label_word() {
        let spec = resolve_model("gemma-3-27b").unwrap();
        let candidates = [option(0, "Gemma 3 27B"), option(1, "Gemma 3 27B IT")];
        assert_eq!(pick_option(&spec, &candidates).unwrap().index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selects_category_then_option() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone());
        let spec = resolve_model("gemini-2.0-flash").unwrap();

        let chosen = navigator(&page, &selectors).select_model(&spec).await.unwrap();
        assert_eq!(chosen, "Gemini 2.0 Flash");
        assert_eq!(page.selected_model().as_deref(), Some("Gemini 2.0 Flash"));
        assert_eq!(page.clicks(), vec!["Gemini 2.5 Pro", "Gemini 2.0", "Gemini 2.0 Flash"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_option_dismisses_picker() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone());
        let spec = resolve_model("gemini-2.0-ultra").unwrap();

        let err = navigator(&page, &selectors).select_model(&spec).await.unwrap_err();
        assert_eq!(err.kind, ChatErrorKind::ModelOptionNotFound);
        assert_eq!(err.stage, Stage::ModelSelected);
        assert_eq!(page.keys(), vec!["Escape"]);
        assert_eq!(page.selected_model(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambiguous_options_dismiss_picker() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone()).with_category(
            "Gemini 2.5",
            &["Gemini 2.5 Pro Preview 05-06", "Gemini 2.5 Pro Preview 06-05"],
        );
        let spec = resolve_model("gemini-2.5-pro-preview").unwrap();

        let err = navigator(&page, &selectors).select_model(&spec).await.unwrap_err();
        assert_eq!(err.kind, ChatErrorKind::AmbiguousModelOption);
        assert!(err.message.contains("06-05"));
        assert_eq!(page.keys(), vec!["Escape"]);
        assert_eq!(page.selected_model(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_category() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone());
        let spec = resolve_model("gemini-1.5-pro").unwrap();

        let err = navigator(&page, &selectors).select_model(&spec).await.unwrap_err();
        assert_eq!(err.kind, ChatErrorKind::CategoryNotFound);
        assert_eq!(page.keys(), vec!["Escape"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_selector() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone()).without(&selectors.model_selector);
        let spec = resolve_model("gemini-2.0-flash").unwrap();

        let err = navigator(&page, &selectors).select_model(&spec).await.unwrap_err();
        assert_eq!(err.kind, ChatErrorKind::SelectorNotFound);
        assert!(page.clicks().is_empty());
    }
}
