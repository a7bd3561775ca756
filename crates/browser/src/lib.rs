//! Chrome DevTools Protocol plumbing for driving the web app.
//!
//! - `cdp`: WebSocket client for CDP commands
//! - `launcher`: spawns Chrome against a persisted profile and connects to its page target
//! - `page`: the selector-based `Page` surface the pipeline drives, and its CDP implementation

pub mod cdp;
pub mod launcher;
pub mod page;

pub use cdp::CdpClient;
pub use launcher::{find_browser_binary, is_sign_in_url, ChromeLauncher, Launcher};
pub use page::{locate, normalize_text, CdpPage, ElementState, Locator, Match, Page};
