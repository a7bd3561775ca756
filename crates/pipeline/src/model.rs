//! Model identifier → UI navigation path.

use gembridge_core::{ChatError, ChatErrorKind, Stage};
use std::fmt;

/// Category headings of the model picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Gemini25,
    Gemini20,
    Gemini15,
    Gemma,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Gemini25 => "GEMINI 2.5",
            Self::Gemini20 => "GEMINI 2.0",
            Self::Gemini15 => "GEMINI 1.5",
            Self::Gemma => "GEMMA",
        }
    }

    /// Lower-cased words of the label, e.g. `["gemini", "2.5"]`.
    pub fn label_words(&self) -> Vec<String> {
        self.label()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Version markers, in priority order.
const MARKERS: [(&str, Category); 4] = [
    ("2.5", Category::Gemini25),
    ("2.0", Category::Gemini20),
    ("1.5", Category::Gemini15),
    ("gemma", Category::Gemma),
];

/// Tokens that only restate the category and never discriminate an option.
const NON_KEYWORDS: [&str; 4] = ["2.5", "2.0", "1.5", "gemini"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub category: Category,
    /// Lower-cased tokens every matching option must contain, in identifier order.
    pub keywords: Vec<String>,
}

const MODELS_PREFIX: &str = "models/";

/// Trim whitespace and a leading `models/` prefix, in any case.
pub fn normalize_identifier(identifier: &str) -> &str {
    let trimmed = identifier.trim();
    match trimmed.get(..MODELS_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(MODELS_PREFIX) => {
            trimmed[MODELS_PREFIX.len()..].trim()
        }
        _ => trimmed,
    }
}

pub fn resolve_model(identifier: &str) -> Result<ModelSpec, ChatError> {
    let id = normalize_identifier(identifier).to_lowercase();

    let category = MARKERS
        .iter()
        .find(|(marker, _)| id.contains(marker))
        .map(|(_, category)| *category)
        .ok_or_else(|| {
            ChatError::new(
                ChatErrorKind::UnresolvedCategory,
                Stage::ModelSelected,
                format!(
                    "model '{}' carries no known version marker (2.5, 2.0, 1.5, gemma)",
                    identifier.trim()
                ),
            )
        })?;

    let keywords = id
        .split('-')
        .filter(|token| !token.is_empty() && !NON_KEYWORDS.contains(token))
        .map(str::to_string)
        .collect();

    Ok(ModelSpec { category, keywords })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_resolve_to_labels() {
        let cases = [
            ("gemini-2.5-pro", "GEMINI 2.5"),
            ("gemini-2.0-flash", "GEMINI 2.0"),
            ("gemini-1.5-flash-8b", "GEMINI 1.5"),
            ("gemma-3-27b-it", "GEMMA"),
            ("Gemma-3-12B", "GEMMA"),
        ];
        for (id, label) in cases {
            assert_eq!(resolve_model(id).unwrap().category.label(), label, "{}", id);
        }
    }

    #[test]
    fn test_marker_priority() {
        // 2.5 wins even when another marker is present
        let spec = resolve_model("gemini-2.5-vs-1.5").unwrap();
        assert_eq!(spec.category, Category::Gemini25);
        let spec = resolve_model("gemma-2.0-port").unwrap();
        assert_eq!(spec.category, Category::Gemini20);
    }

    #[test]
    fn test_unresolved_category() {
        for id in ["gpt-4o", "gemini-pro", "", "claude-3"] {
            let err = resolve_model(id).unwrap_err();
            assert_eq!(err.kind, ChatErrorKind::UnresolvedCategory, "{}", id);
        }
    }

    #[test]
    fn test_keywords_exclude_family_and_version() {
        let spec = resolve_model("gemini-2.5-pro-preview").unwrap();
        assert_eq!(spec.keywords, vec!["pro", "preview"]);
        let spec = resolve_model("gemini-2.0-flash").unwrap();
        assert_eq!(spec.keywords, vec!["flash"]);
    }

    #[test]
    fn test_keywords_drop_empty_tokens_and_lowercase() {
        let spec = resolve_model("Gemini--2.5-Flash-").unwrap();
        assert_eq!(spec.keywords, vec!["flash"]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let a = resolve_model("gemini-1.5-flash-8b").unwrap();
        let b = resolve_model("gemini-1.5-flash-8b").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.keywords, vec!["flash", "8b"]);
    }

    #[test]
    fn test_models_prefix_is_stripped() {
        let spec = resolve_model("  models/gemini-2.0-flash ").unwrap();
        assert_eq!(spec.category, Category::Gemini20);
        assert_eq!(spec.keywords, vec!["flash"]);
        assert_eq!(normalize_identifier("models/x"), "x");
        assert_eq!(normalize_identifier("Models/x"), "x");
        assert_eq!(normalize_identifier("MODELS/ gemma-3"), "gemma-3");
        assert_eq!(normalize_identifier("mod"), "mod");
    }

    #[test]
    fn test_mixed_case_models_prefix_resolves() {
        let spec = resolve_model("Models/Gemini-2.0-Flash").unwrap();
        assert_eq!(spec.category, Category::Gemini20);
        assert_eq!(spec.keywords, vec!["flash"]);
    }

    #[test]
    fn test_label_words() {
        assert_eq!(Category::Gemini20.label_words(), vec!["gemini", "2.0"]);
        assert_eq!(Category::Gemma.label_words(), vec!["gemma"]);
    }
}
