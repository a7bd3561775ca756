//! Chrome process launch against the persisted, signed-in profile.

use async_trait::async_trait;
use gembridge_core::config::BrowserConfig;
use gembridge_core::{Error, Paths, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::cdp::CdpClient;
use crate::page::{CdpPage, Page};

/// Hides the automation flag the web app could use to refuse service.
const WEBDRIVER_MASK_JS: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

const SIGN_IN_HOST: &str = "accounts.google.com";

/// Produces the page the session drives. One call per process.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Page>>;
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    binary: Option<String>,
    profile_dir: PathBuf,
    app_url: String,
    headless: bool,
    lang: String,
    window: (u32, u32),
    user_agent: Option<String>,
    startup_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(config: &BrowserConfig, paths: &Paths) -> Self {
        Self {
            binary: config.binary.clone(),
            profile_dir: config.profile_dir(paths),
            app_url: config.app_url.clone(),
            headless: config.headless,
            lang: config.lang.clone(),
            window: (config.window_width, config.window_height),
            user_agent: config.user_agent.clone(),
            startup_timeout: config.startup_timeout(),
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    fn browser_args(&self, debug_port: u16) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", debug_port),
            format!("--user-data-dir={}", self.profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-extensions".to_string(),
            "--password-store=basic".to_string(),
            "--no-sandbox".to_string(),
            format!("--lang={}", self.lang),
            format!("--window-size={},{}", self.window.0, self.window.1),
        ];
        if let Some(ua) = self.user_agent.as_deref().filter(|ua| !ua.trim().is_empty()) {
            args.push(format!("--user-agent={}", ua));
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.push("about:blank".to_string());
        args
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Page>> {
        let browser_path = find_browser_binary(self.binary.as_deref()).ok_or_else(|| {
            Error::Browser(
                "No Chrome/Chromium/Edge binary found. Install one or set browser.binary".into(),
            )
        })?;

        std::fs::create_dir_all(&self.profile_dir)?;

        let debug_port = find_free_port().await.map_err(Error::Browser)?;
        let args = self.browser_args(debug_port);

        info!(
            binary = %browser_path,
            port = debug_port,
            headless = self.headless,
            profile = %self.profile_dir.display(),
            "Launching browser"
        );

        let child = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", browser_path, e)))?;

        wait_for_cdp_ready(debug_port, self.startup_timeout)
            .await
            .map_err(Error::Browser)?;
        let page_ws_url = get_page_ws_url(debug_port).await.map_err(Error::Browser)?;
        let cdp = CdpClient::connect(&page_ws_url)
            .await
            .map_err(Error::Browser)?;

        for domain in ["Page", "Runtime", "DOM"] {
            cdp.enable_domain(domain).await.map_err(Error::Browser)?;
        }
        cdp.add_script_on_new_document(WEBDRIVER_MASK_JS)
            .await
            .map_err(Error::Browser)?;
        debug!(ws_url = %page_ws_url, "CDP connection established (page target)");

        cdp.navigate(&self.app_url).await.map_err(Error::Browser)?;
        wait_for_document_ready(&cdp, self.startup_timeout).await?;

        let landed = cdp
            .evaluate_value("location.href")
            .await
            .map_err(Error::Browser)?;
        let landed = landed.as_str().unwrap_or_default();
        if is_sign_in_url(landed) {
            warn!(
                url = landed,
                "Landed on the sign-in page; the profile is not signed in. Run `gembridge login` first"
            );
        } else {
            info!(url = landed, "Web app loaded");
        }

        Ok(Arc::new(CdpPage::new(cdp, child)))
    }
}

/// Find a Chromium-family browser: the configured binary first, then well-known names and paths.
pub fn find_browser_binary(configured: Option<&str>) -> Option<String> {
    if let Some(path) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        if Path::new(path).exists() || which::which(path).is_ok() {
            return Some(path.to_string());
        }
        warn!(binary = path, "Configured browser binary not found, searching the system");
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "microsoft-edge",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Whether `url` is on the Google sign-in host.
pub fn is_sign_in_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(SIGN_IN_HOST)))
        .unwrap_or(false)
}

async fn find_free_port() -> std::result::Result<u16, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("Failed to bind to find free port: {}", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local addr: {}", e))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until Chrome's CDP endpoint answers.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> std::result::Result<String, String> {
    let start = Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(format!(
                "Chrome CDP not ready after {}s on port {}",
                timeout.as_secs(),
                port
            ));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// WebSocket URL of the first page target. Retries since the tab may appear late.
async fn get_page_ws_url(port: u16) -> std::result::Result<String, String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };

        let ws_url = targets
            .iter()
            .filter(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
            .find_map(|t| t.get("webSocketDebuggerUrl").and_then(|v| v.as_str()));
        if let Some(ws_url) = ws_url {
            return Ok(ws_url.to_string());
        }
    }

    Err("No page target found after retries".to_string())
}

const LOAD_STATE_JS: &str = "({ state: document.readyState, href: location.href })";

/// The navigated document (not the initial blank one) has finished loading.
fn document_loaded(probe: &Value) -> bool {
    let state = probe.get("state").and_then(|v| v.as_str());
    let href = probe.get("href").and_then(|v| v.as_str()).unwrap_or("about:blank");
    state == Some("complete") && href != "about:blank"
}

async fn wait_for_document_ready(cdp: &CdpClient, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        match cdp.evaluate_value(LOAD_STATE_JS).await {
            Ok(probe) if document_loaded(&probe) => return Ok(()),
            Ok(probe) => debug!(?probe, "Document still loading"),
            Err(e) => debug!("readyState probe failed: {}", e),
        }
        if start.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "page did not finish loading within {}s",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gembridge_core::Config;

    fn launcher(headless: bool) -> ChromeLauncher {
        let mut config = Config::default();
        config.browser.headless = headless;
        config.browser.window_width = 1280;
        config.browser.window_height = 800;
        let paths = Paths::with_base(PathBuf::from("/tmp/gembridge-launcher-test"));
        ChromeLauncher::new(&config.browser, &paths)
    }

    #[test]
    fn test_browser_args_carry_profile_and_stealth_flags() {
        let args = launcher(false).browser_args(9333);
        assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
        assert!(args.contains(
            &"--user-data-dir=/tmp/gembridge-launcher-test/browser-profile".to_string()
        ));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.contains(&"--window-size=1280,800".to_string()));
        assert!(args.contains(&"--lang=en-US".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=")));
        assert!(!args.contains(&"--headless=new".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_headless_override() {
        let args = launcher(false).with_headless(true).browser_args(1);
        assert!(args.contains(&"--headless=new".to_string()));
        let args = launcher(true).with_headless(false).browser_args(1);
        assert!(!args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn test_sign_in_url_detection() {
        assert!(is_sign_in_url(
            "https://accounts.google.com/v3/signin/identifier?continue=x"
        ));
        assert!(!is_sign_in_url("https://aistudio.google.com/prompts/new_chat"));
        assert!(!is_sign_in_url("about:blank"));
        assert!(!is_sign_in_url("not a url"));
    }

    #[test]
    fn test_sign_in_url_with_port_or_userinfo() {
        assert!(is_sign_in_url("https://accounts.google.com:443/signin"));
        assert!(is_sign_in_url("https://user@accounts.google.com/x"));
        assert!(is_sign_in_url("https://Accounts.Google.com/"));
        assert!(!is_sign_in_url("https://accounts.google.com.evil.test/"));
    }

    #[test]
    fn test_blank_document_is_not_loaded() {
        use serde_json::json;
        assert!(!document_loaded(&json!({"state": "complete", "href": "about:blank"})));
        assert!(!document_loaded(&json!({"state": "loading", "href": "https://aistudio.google.com/"})));
        assert!(!document_loaded(&json!(null)));
        assert!(document_loaded(
            &json!({"state": "complete", "href": "https://aistudio.google.com/prompts/new_chat"})
        ));
    }

    #[tokio::test]
    async fn test_find_free_port() {
        let port = find_free_port().await.unwrap();
        assert!(port > 0);
    }
}
