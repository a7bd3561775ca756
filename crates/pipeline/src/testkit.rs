//! Scripted stand-ins for the browser, for tests of the pipeline and the gateway.
//!
//! `ScriptedPage` models just enough of the web app: a two-level model picker,
//! a prompt box, a run button, a generating marker driven by (tokio) time, and
//! one response container per finished turn.

use async_trait::async_trait;
use gembridge_browser::{ElementState, Launcher, Page};
use gembridge_core::config::SelectorsConfig;
use gembridge_core::{ChatErrorKind, Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::diagnostics::DiagnosticSink;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// How the generating marker behaves after a submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Normal {
        starts_after: Duration,
        runs_for: Duration,
    },
    NeverStarts,
    NeverFinishes {
        starts_after: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Running,
    Finished,
}

impl Generation {
    fn phase(&self, submitted_at: Instant, now: Instant) -> Phase {
        let since = now.saturating_duration_since(submitted_at);
        match *self {
            Generation::Normal {
                starts_after,
                runs_for,
            } => {
                if since < starts_after {
                    Phase::Pending
                } else if since < starts_after + runs_for {
                    Phase::Running
                } else {
                    Phase::Finished
                }
            }
            Generation::NeverStarts => Phase::Pending,
            Generation::NeverFinishes { starts_after } => {
                if since < starts_after {
                    Phase::Pending
                } else {
                    Phase::Running
                }
            }
        }
    }
}

struct Turn {
    prompt: String,
    reply: String,
    submitted_at: Instant,
    last_keystroke: Option<Instant>,
}

struct State {
    catalog: Vec<(String, Vec<String>)>,
    current_model: String,
    picker_open: bool,
    open_category: Option<usize>,
    selected: Option<String>,
    input_focused: bool,
    draft: String,
    last_keystroke: Option<Instant>,
    turns: Vec<Turn>,
    reply: String,
    generation: Generation,
    missing: Vec<String>,
    clicks: Vec<(String, String)>,
    keys: Vec<String>,
    screenshots: usize,
}

pub struct ScriptedPage {
    selectors: SelectorsConfig,
    state: Mutex<State>,
}

fn shown(text: &str, enabled: bool) -> ElementState {
    ElementState {
        text: text.to_string(),
        visible: true,
        enabled,
    }
}

impl ScriptedPage {
    pub fn new(selectors: SelectorsConfig) -> Self {
        let catalog = vec![
            (
                "Gemini 2.5".to_string(),
                vec!["Gemini 2.5 Pro".to_string(), "Gemini 2.5 Flash Preview 05-20".to_string()],
            ),
            (
                "Gemini 2.0".to_string(),
                vec!["Gemini 2.0 Flash".to_string(), "Gemini 2.0 Flash-Lite".to_string()],
            ),
            (
                "Gemma".to_string(),
                vec!["Gemma 3 27B".to_string(), "Gemma 3 12B".to_string()],
            ),
        ];
        Self {
            selectors,
            state: Mutex::new(State {
                catalog,
                current_model: "Gemini 2.5 Pro".to_string(),
                picker_open: false,
                open_category: None,
                selected: None,
                input_focused: false,
                draft: String::new(),
                last_keystroke: None,
                turns: Vec::new(),
                reply: "Hello from the scripted page.".to_string(),
                generation: Generation::Normal {
                    starts_after: Duration::from_secs(1),
                    runs_for: Duration::from_secs(5),
                },
                missing: Vec::new(),
                clicks: Vec::new(),
                keys: Vec::new(),
                screenshots: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_reply(self, reply: &str) -> Self {
        self.set_reply(reply);
        self
    }

    pub fn with_generation(self, generation: Generation) -> Self {
        self.state().generation = generation;
        self
    }

    /// Replace the options listed under a category heading, adding the heading if new.
    pub fn with_category(self, label: &str, options: &[&str]) -> Self {
        {
            let mut st = self.state();
            let options: Vec<String> = options.iter().map(|o| o.to_string()).collect();
            match st.catalog.iter_mut().find(|(l, _)| l == label) {
                Some(entry) => entry.1 = options,
                None => st.catalog.push((label.to_string(), options)),
            }
        }
        self
    }

    /// Make every element behind `css` absent.
    pub fn without(self, css: &str) -> Self {
        self.state().missing.push(css.to_string());
        self
    }

    /// Reply given to turns submitted from now on.
    pub fn set_reply(&self, reply: &str) {
        self.state().reply = reply.to_string();
    }

    pub fn reply(&self) -> String {
        self.state().reply.clone()
    }

    /// Text of every clicked element, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.state().clicks.iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn clicked_selectors(&self) -> Vec<String> {
        self.state().clicks.iter().map(|(css, _)| css.clone()).collect()
    }

    pub fn selected_model(&self) -> Option<String> {
        self.state().selected.clone()
    }

    pub fn submitted_prompts(&self) -> Vec<String> {
        self.state().turns.iter().map(|t| t.prompt.clone()).collect()
    }

    /// Time between the last keystroke of each turn and its submit click.
    pub fn pre_submit_gaps(&self) -> Vec<Duration> {
        self.state()
            .turns
            .iter()
            .filter_map(|t| t.last_keystroke.map(|k| t.submitted_at.saturating_duration_since(k)))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().keys.clone()
    }

    pub fn screenshots(&self) -> usize {
        self.state().screenshots
    }

    fn elements(&self, st: &State, css: &str) -> Vec<ElementState> {
        if st.missing.iter().any(|m| m == css) {
            return Vec::new();
        }
        let sel = &self.selectors;
        let now = Instant::now();
        if css == sel.model_selector {
            vec![shown(&st.current_model, true)]
        } else if css == sel.model_category {
            if st.picker_open {
                st.catalog.iter().map(|(label, _)| shown(label, true)).collect()
            } else {
                Vec::new()
            }
        } else if css == sel.model_option {
            st.open_category
                .and_then(|i| st.catalog.get(i))
                .map(|(_, options)| options.iter().map(|o| shown(o, true)).collect())
                .unwrap_or_default()
        } else if css == sel.prompt_input {
            vec![shown(&st.draft, true)]
        } else if css == sel.submit_button {
            vec![shown("Run", !st.draft.is_empty())]
        } else if css == sel.generating_marker {
            let running = st
                .turns
                .last()
                .map(|t| st.generation.phase(t.submitted_at, now) == Phase::Running)
                .unwrap_or(false);
            if running {
                vec![shown("Stop", true)]
            } else {
                Vec::new()
            }
        } else if css == sel.response_container {
            st.turns
                .iter()
                .filter(|t| st.generation.phase(t.submitted_at, now) == Phase::Finished)
                .map(|t| shown(&t.reply, true))
                .collect()
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn query(&self, css: &str) -> Result<Vec<ElementState>> {
        let st = self.state();
        Ok(self.elements(&st, css))
    }

    async fn click_at(&self, css: &str, index: usize) -> Result<()> {
        let mut st = self.state();
        let target = self
            .elements(&st, css)
            .into_iter()
            .nth(index)
            .ok_or_else(|| Error::NotFound(format!("no element #{} for '{}'", index, css)))?;
        st.clicks.push((css.to_string(), target.text.clone()));

        let sel = &self.selectors;
        if css == sel.model_selector {
            st.picker_open = true;
        } else if css == sel.model_category {
            st.open_category = Some(index);
        } else if css == sel.model_option {
            st.selected = Some(target.text.clone());
            st.current_model = target.text;
            st.picker_open = false;
            st.open_category = None;
        } else if css == sel.prompt_input {
            st.input_focused = true;
        } else if css == sel.submit_button {
            let prompt = std::mem::take(&mut st.draft);
            let reply = st.reply.clone();
            let last_keystroke = st.last_keystroke.take();
            st.turns.push(Turn {
                prompt,
                reply,
                submitted_at: Instant::now(),
                last_keystroke,
            });
            st.input_focused = false;
        }
        Ok(())
    }

    async fn type_char(&self, ch: char) -> Result<()> {
        let mut st = self.state();
        if !st.input_focused {
            return Err(Error::Browser("no element has focus".into()));
        }
        st.draft.push(ch);
        st.last_keystroke = Some(Instant::now());
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut st = self.state();
        st.keys.push(key.to_string());
        if key == "Escape" {
            st.picker_open = false;
            st.open_category = None;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok("https://aistudio.google.com/prompts/new_chat".to_string())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        self.state().screenshots += 1;
        Ok(PNG_MAGIC.to_vec())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Hands out a prepared page.
pub struct ScriptedLauncher {
    page: Arc<ScriptedPage>,
}

impl ScriptedLauncher {
    pub fn new(page: Arc<ScriptedPage>) -> Self {
        Self { page }
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self) -> Result<Arc<dyn Page>> {
        Ok(self.page.clone())
    }
}

/// Always fails, like a host without a browser.
pub struct FailingLauncher(pub String);

#[async_trait]
impl Launcher for FailingLauncher {
    async fn launch(&self) -> Result<Arc<dyn Page>> {
        Err(Error::Browser(self.0.clone()))
    }
}

/// Remembers which failures were captured.
#[derive(Default)]
pub struct RecordingSink {
    kinds: Mutex<Vec<ChatErrorKind>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<ChatErrorKind> {
        self.kinds
            .lock()
            .map(|k| k.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl DiagnosticSink for RecordingSink {
    async fn capture(&self, kind: ChatErrorKind, page: &dyn Page) {
        let _ = page.screenshot_png().await;
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.push(kind);
        }
    }
}
