use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::paths::Paths;

/// What the gateway does with a chat request while another run holds the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Queue behind the in-flight run (FIFO).
    #[default]
    Wait,
    /// Fail immediately with `Busy`.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub api_token: Option<String>,
    /// How long a request waits for the browser session to come up.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default)]
    pub queue_policy: QueuePolicy,
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_ready_timeout_secs() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            api_token: None,
            ready_timeout_secs: default_ready_timeout_secs(),
            queue_policy: QueuePolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Explicit Chrome/Chromium/Edge binary. Looked up on the system if unset.
    #[serde(default)]
    pub binary: Option<String>,
    /// Profile directory holding the signed-in session. Defaults to `~/.gembridge/browser-profile`.
    #[serde(default)]
    pub profile_dir: Option<String>,
    #[serde(default = "default_app_url")]
    pub app_url: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

fn default_app_url() -> String {
    "https://aistudio.google.com/prompts/new_chat".to_string()
}

fn default_lang() -> String {
    "en-US".to_string()
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_user_agent() -> Option<String> {
    Some(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36"
            .to_string(),
    )
}

fn default_startup_timeout_secs() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: None,
            profile_dir: None,
            app_url: default_app_url(),
            headless: false,
            lang: default_lang(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            user_agent: default_user_agent(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

impl BrowserConfig {
    pub fn profile_dir(&self, paths: &Paths) -> PathBuf {
        match self.profile_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => expand_home(dir),
            _ => paths.profile_dir(),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Inclusive range of milliseconds a randomized delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl DelayRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Ceiling for "element present/clickable" waits.
    #[serde(default = "default_selector_timeout_ms")]
    pub selector_timeout_ms: u64,
    /// Ceiling for the generating marker to appear after submit.
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    /// Ceiling for the generating marker to go away.
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause after each navigation step and before extraction.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_typing_delay")]
    pub typing_delay_ms: DelayRange,
    #[serde(default = "default_pre_submit_delay")]
    pub pre_submit_delay_ms: DelayRange,
    #[serde(default = "default_screenshots")]
    pub screenshots: bool,
    /// Phrases that mark extracted text as an error rendered by the web app.
    #[serde(default = "default_upstream_error_phrases")]
    pub upstream_error_phrases: Vec<String>,
}

fn default_selector_timeout_ms() -> u64 {
    15_000
}

fn default_start_timeout_ms() -> u64 {
    15_000
}

fn default_completion_timeout_ms() -> u64 {
    600_000
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_settle_delay_ms() -> u64 {
    1_000
}

fn default_typing_delay() -> DelayRange {
    DelayRange::new(50, 150)
}

fn default_pre_submit_delay() -> DelayRange {
    DelayRange::new(500, 1_500)
}

fn default_screenshots() -> bool {
    true
}

fn default_upstream_error_phrases() -> Vec<String> {
    vec!["internal error has occurred".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            selector_timeout_ms: default_selector_timeout_ms(),
            start_timeout_ms: default_start_timeout_ms(),
            completion_timeout_ms: default_completion_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            typing_delay_ms: default_typing_delay(),
            pre_submit_delay_ms: default_pre_submit_delay(),
            screenshots: default_screenshots(),
            upstream_error_phrases: default_upstream_error_phrases(),
        }
    }
}

impl PipelineConfig {
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// CSS selectors for every element of the web app the pipeline touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorsConfig {
    #[serde(default = "default_model_selector")]
    pub model_selector: String,
    #[serde(default = "default_model_category")]
    pub model_category: String,
    #[serde(default = "default_model_option")]
    pub model_option: String,
    #[serde(default = "default_prompt_input")]
    pub prompt_input: String,
    #[serde(default = "default_submit_button")]
    pub submit_button: String,
    #[serde(default = "default_generating_marker")]
    pub generating_marker: String,
    #[serde(default = "default_response_container")]
    pub response_container: String,
}

fn default_model_selector() -> String {
    "ms-model-selector-two-column mat-select".to_string()
}

fn default_model_category() -> String {
    "div.model-category-container".to_string()
}

fn default_model_option() -> String {
    "mat-option".to_string()
}

fn default_prompt_input() -> String {
    ".text-wrapper".to_string()
}

fn default_submit_button() -> String {
    "button.run-button".to_string()
}

fn default_generating_marker() -> String {
    "button.run-button.stoppable".to_string()
}

fn default_response_container() -> String {
    ".model-prompt-container".to_string()
}

impl Default for SelectorsConfig {
    fn default() -> Self {
        Self {
            model_selector: default_model_selector(),
            model_category: default_model_category(),
            model_option: default_model_option(),
            prompt_input: default_prompt_input(),
            submit_button: default_submit_button(),
            generating_marker: default_generating_marker(),
            response_container: default_response_container(),
        }
    }
}

fn default_models() -> Vec<String> {
    [
        "gemini-2.5-pro-preview",
        "gemini-2.5-pro",
        "gemini-2.5-flash-preview",
        "gemini-2.0-flash",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub selectors: SelectorsConfig,
    /// Model ids advertised by the models endpoint.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            browser: BrowserConfig::default(),
            pipeline: PipelineConfig::default(),
            selectors: SelectorsConfig::default(),
            models: default_models(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        for (name, range) in [
            ("pipeline.typingDelayMs", p.typing_delay_ms),
            ("pipeline.preSubmitDelayMs", p.pre_submit_delay_ms),
        ] {
            if range.min > range.max {
                return Err(Error::Config(format!(
                    "{}: min ({}) is greater than max ({})",
                    name, range.min, range.max
                )));
            }
        }
        if p.poll_interval_ms == 0 {
            return Err(Error::Config("pipeline.pollIntervalMs must be positive".into()));
        }
        for (name, value) in [
            ("pipeline.selectorTimeoutMs", p.selector_timeout_ms),
            ("pipeline.startTimeoutMs", p.start_timeout_ms),
            ("pipeline.completionTimeoutMs", p.completion_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be positive", name)));
            }
        }
        if self.browser.app_url.trim().is_empty() {
            return Err(Error::Config("browser.appUrl is required".into()));
        }
        Ok(())
    }

    /// Bearer token guarding the gateway, if one is configured.
    pub fn api_token(&self) -> Option<String> {
        self.gateway
            .api_token
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}
