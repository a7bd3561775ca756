//! Failure taxonomy of a chat turn driven through the web UI.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classified reason a chat turn did not produce an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatErrorKind {
    /// The browser session never became ready (or failed to start).
    NotReady,
    /// A run is already in flight and the queue policy rejects waiting.
    Busy,
    /// The model identifier carries no recognized version marker.
    UnresolvedCategory,
    /// A control the pipeline needs never became present/clickable.
    SelectorNotFound,
    CategoryNotFound,
    ModelOptionNotFound,
    /// More than one option matched the keywords and none matched exactly.
    AmbiguousModelOption,
    GenerationNeverStarted,
    GenerationTimedOut,
    NoResponseFound,
    EmptyResponse,
    /// The UI rendered its own error message in place of an answer.
    UpstreamInternalError,
}

impl ChatErrorKind {
    /// Stable snake_case code, used in API error bodies and diagnostic file names.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::Busy => "busy",
            Self::UnresolvedCategory => "unresolved_category",
            Self::SelectorNotFound => "selector_not_found",
            Self::CategoryNotFound => "category_not_found",
            Self::ModelOptionNotFound => "model_option_not_found",
            Self::AmbiguousModelOption => "ambiguous_model_option",
            Self::GenerationNeverStarted => "generation_never_started",
            Self::GenerationTimedOut => "generation_timed_out",
            Self::NoResponseFound => "no_response_found",
            Self::EmptyResponse => "empty_response",
            Self::UpstreamInternalError => "upstream_internal_error",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotReady => "NotReady",
            Self::Busy => "Busy",
            Self::UnresolvedCategory => "UnresolvedCategory",
            Self::SelectorNotFound => "SelectorNotFound",
            Self::CategoryNotFound => "CategoryNotFound",
            Self::ModelOptionNotFound => "ModelOptionNotFound",
            Self::AmbiguousModelOption => "AmbiguousModelOption",
            Self::GenerationNeverStarted => "GenerationNeverStarted",
            Self::GenerationTimedOut => "GenerationTimedOut",
            Self::NoResponseFound => "NoResponseFound",
            Self::EmptyResponse => "EmptyResponse",
            Self::UpstreamInternalError => "UpstreamInternalError",
        }
    }
}

impl fmt::Display for ChatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// States of the interaction pipeline, in the only order they may be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Idle,
    ModelSelected,
    PromptTyped,
    Submitted,
    Generating,
    Completed,
    Extracted,
    Done,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::ModelSelected => "MODEL_SELECTED",
            Self::PromptTyped => "PROMPT_TYPED",
            Self::Submitted => "SUBMITTED",
            Self::Generating => "GENERATING",
            Self::Completed => "COMPLETED",
            Self::Extracted => "EXTRACTED",
            Self::Done => "DONE",
        }
    }

    /// The stage that follows this one; `None` once `Done`.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Idle => Some(Self::ModelSelected),
            Self::ModelSelected => Some(Self::PromptTyped),
            Self::PromptTyped => Some(Self::Submitted),
            Self::Submitted => Some(Self::Generating),
            Self::Generating => Some(Self::Completed),
            Self::Completed => Some(Self::Extracted),
            Self::Extracted => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A failed chat turn: what went wrong, which state was being entered, and why.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at {stage}: {message}")]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub stage: Stage,
    pub message: String,
}

impl ChatError {
    pub fn new(kind: ChatErrorKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::NotReady, Stage::Idle, message)
    }
}
