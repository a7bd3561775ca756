pub mod chat;
pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use chat::{ChatError, ChatErrorKind, Stage};
pub use config::Config;
pub use error::{Error, Result};
pub use paths::Paths;
