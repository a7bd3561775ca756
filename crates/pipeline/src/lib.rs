//! Drives one chat turn at a time through the web UI.
//!
//! - `model`: model identifier → picker category + keywords
//! - `session`: the single browser session and its readiness gate
//! - `navigator`: model picker navigation
//! - `pipeline`: the per-turn state machine
//! - `service`: serializes turns over the shared session

pub mod diagnostics;
pub mod model;
pub mod navigator;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod timing;
pub mod wait;
#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use diagnostics::{DiagnosticSink, NoopSink, ScreenshotDir};
pub use model::{resolve_model, Category, ModelSpec};
pub use navigator::Navigator;
pub use pipeline::{classify, ChatPipeline, StageTracker};
pub use service::ChatService;
pub use session::{SessionHandle, SessionState};
pub use wait::{Poller, WaitTimeout};
