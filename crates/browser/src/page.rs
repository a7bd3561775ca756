//! The UI surface the pipeline drives.
//!
//! `Page` is selector based: no element handle ever outlives a call. Each
//! operation re-runs `querySelectorAll`, so a re-rendered DOM cannot hand back
//! a stale reference.

use async_trait::async_trait;
use base64::Engine;
use gembridge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cdp::CdpClient;

/// Snapshot of one element matched by a selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
}

impl ElementState {
    pub fn clickable(&self) -> bool {
        self.visible && self.enabled
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    /// All elements matching `css`, in document order.
    async fn query(&self, css: &str) -> Result<Vec<ElementState>>;

    /// Click the `index`-th element matching `css`.
    async fn click_at(&self, css: &str, index: usize) -> Result<()>;

    /// Send one character to the focused element.
    async fn type_char(&self, ch: char) -> Result<()>;

    /// Press and release a named key ("Escape", "Enter", ...).
    async fn press_key(&self, key: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn screenshot_png(&self) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}

/// Selects elements by CSS and, optionally, by text they contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub css: String,
    pub has_text: Vec<String>,
}

impl Locator {
    pub fn new(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            has_text: Vec::new(),
        }
    }

    pub fn with_text(mut self, needle: impl Into<String>) -> Self {
        self.has_text.push(needle.into());
        self
    }

    /// Case-insensitive, whitespace-normalized containment of every needle.
    pub fn matches_text(&self, text: &str) -> bool {
        let haystack = normalize_text(text);
        self.has_text
            .iter()
            .all(|needle| haystack.contains(&normalize_text(needle)))
    }
}

/// An element matched by a `Locator`, with its index among the `css` matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub index: usize,
    pub state: ElementState,
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub async fn locate(page: &dyn Page, locator: &Locator) -> Result<Vec<Match>> {
    let elements = page.query(&locator.css).await?;
    Ok(elements
        .into_iter()
        .enumerate()
        .filter(|(_, state)| locator.matches_text(&state.text))
        .map(|(index, state)| Match { index, state })
        .collect())
}

/// A Chrome page target driven over CDP. Owns the browser process.
pub struct CdpPage {
    cdp: CdpClient,
    child: Mutex<Option<Child>>,
}

impl CdpPage {
    pub fn new(cdp: CdpClient, child: Child) -> Self {
        Self {
            cdp,
            child: Mutex::new(Some(child)),
        }
    }
}

const QUERY_JS: &str = r#"(sel => Array.from(document.querySelectorAll(sel)).map(el => {
  const r = el.getBoundingClientRect();
  const st = window.getComputedStyle(el);
  const visible = r.width > 0 && r.height > 0 && st.display !== 'none'
    && st.visibility !== 'hidden' && parseFloat(st.opacity || '1') > 0;
  const enabled = !el.disabled && el.getAttribute('aria-disabled') !== 'true';
  return { text: el.innerText || el.textContent || '', visible, enabled };
}))"#;

const CENTER_JS: &str = r#"((sel, idx) => {
  const el = document.querySelectorAll(sel)[idx];
  if (!el) return null;
  el.scrollIntoView({ block: 'center', inline: 'center' });
  const r = el.getBoundingClientRect();
  return { x: r.left + r.width / 2, y: r.top + r.height / 2 };
})"#;

#[async_trait]
impl Page for CdpPage {
    async fn query(&self, css: &str) -> Result<Vec<ElementState>> {
        let expr = format!("{}({})", QUERY_JS, serde_json::to_string(css)?);
        let value = self.cdp.evaluate_value(&expr).await.map_err(cdp_err)?;
        Ok(serde_json::from_value(value)?)
    }

    async fn click_at(&self, css: &str, index: usize) -> Result<()> {
        let expr = format!("{}({}, {})", CENTER_JS, serde_json::to_string(css)?, index);
        let center = self.cdp.evaluate_value(&expr).await.map_err(cdp_err)?;
        let (x, y) = match (
            center.get("x").and_then(Value::as_f64),
            center.get("y").and_then(Value::as_f64),
        ) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(Error::NotFound(format!(
                    "no element #{} for '{}'",
                    index, css
                )))
            }
        };
        debug!(css, index, x, y, "Clicking element");

        self.cdp
            .dispatch_mouse_event("mouseMoved", x, y, 0)
            .await
            .map_err(cdp_err)?;
        self.cdp
            .dispatch_mouse_event("mousePressed", x, y, 1)
            .await
            .map_err(cdp_err)?;
        self.cdp
            .dispatch_mouse_event("mouseReleased", x, y, 1)
            .await
            .map_err(cdp_err)?;
        Ok(())
    }

    async fn type_char(&self, ch: char) -> Result<()> {
        match char_key(ch) {
            Some((key, code, text)) => {
                self.cdp
                    .dispatch_key_event("keyDown", &key, code.as_str(), Some(text.as_str()))
                    .await
                    .map_err(cdp_err)?;
                self.cdp
                    .dispatch_key_event("keyUp", &key, code.as_str(), None)
                    .await
                    .map_err(cdp_err)?;
            }
            None => {
                self.cdp
                    .insert_text(&ch.to_string())
                    .await
                    .map_err(cdp_err)?;
            }
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let (key, code) = parse_key_spec(key);
        self.cdp
            .dispatch_key_event("rawKeyDown", &key, &code, None)
            .await
            .map_err(cdp_err)?;
        self.cdp
            .dispatch_key_event("keyUp", &key, &code, None)
            .await
            .map_err(cdp_err)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let value = self
            .cdp
            .evaluate_value("location.href")
            .await
            .map_err(cdp_err)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        let data = self.cdp.screenshot().await.map_err(cdp_err)?;
        base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| Error::Browser(format!("Invalid screenshot data: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.cdp.close_browser().await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        Ok(())
    }
}

/// Key event fields for a character a US keyboard types directly.
/// `None` means the character has to be inserted as text.
fn char_key(ch: char) -> Option<(String, String, String)> {
    match ch {
        '\n' | '\r' => Some(("Enter".into(), "Enter".into(), "\r".into())),
        ' ' => Some((" ".into(), "Space".into(), " ".into())),
        c if c.is_ascii_alphabetic() => Some((
            c.to_string(),
            format!("Key{}", c.to_ascii_uppercase()),
            c.to_string(),
        )),
        c if c.is_ascii_digit() => Some((c.to_string(), format!("Digit{}", c), c.to_string())),
        c if c.is_ascii_punctuation() => Some((c.to_string(), String::new(), c.to_string())),
        _ => None,
    }
}

/// Map a key name to its DOM `key` and `code`.
fn parse_key_spec(key: &str) -> (String, String) {
    let code = match key {
        "Enter" | "Return" => "Enter",
        "Tab" => "Tab",
        "Escape" | "Esc" => "Escape",
        "Backspace" => "Backspace",
        "Delete" => "Delete",
        "ArrowUp" | "Up" => "ArrowUp",
        "ArrowDown" | "Down" => "ArrowDown",
        "Space" | " " => "Space",
        _ => {
            if key.chars().count() == 1 {
                return (key.to_string(), format!("Key{}", key.to_uppercase()));
            }
            key
        }
    };
    let key = match code {
        "Space" => " ",
        other => other,
    };
    (key.to_string(), code.to_string())
}

fn cdp_err(e: String) -> Error {
    Error::Browser(format!("CDP: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_matches_all_needles_case_insensitively() {
        let loc = Locator::new("mat-option").with_text("pro").with_text("Preview");
        assert!(loc.matches_text("Gemini 2.5 Pro Preview\n  03-25"));
        assert!(!loc.matches_text("Gemini 2.5 Pro"));
    }

    #[test]
    fn test_locator_normalizes_whitespace() {
        let loc = Locator::new("div").with_text("GEMINI 2.0");
        assert!(loc.matches_text("  Gemini\n\t2.0  "));
        assert!(Locator::new("div").matches_text("anything"));
    }

    #[test]
    fn test_char_key_mapping() {
        assert_eq!(
            char_key('a'),
            Some(("a".into(), "KeyA".into(), "a".into()))
        );
        assert_eq!(
            char_key('7'),
            Some(("7".into(), "Digit7".into(), "7".into()))
        );
        assert_eq!(char_key('\n').map(|k| k.0), Some("Enter".to_string()));
        assert_eq!(char_key('é'), None);
        assert_eq!(char_key('\t'), None);
    }

    #[test]
    fn test_parse_key_spec() {
        assert_eq!(parse_key_spec("Esc"), ("Escape".into(), "Escape".into()));
        assert_eq!(parse_key_spec("Space"), (" ".into(), "Space".into()));
        assert_eq!(parse_key_spec("x"), ("x".into(), "KeyX".into()));
    }

    #[test]
    fn test_element_state_from_query_json() {
        let raw = serde_json::json!([{ "text": "Run", "visible": true, "enabled": false }]);
        let states: Vec<ElementState> = serde_json::from_value(raw).unwrap();
        assert_eq!(states[0].text, "Run");
        assert!(!states[0].clickable());
    }
}
