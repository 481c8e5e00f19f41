//! Context-dependent message detection.
//!
//! Messages like "5", "next page", "same for him" or "haan" only make sense
//! against the previous turns, so they must never be served from (or
//! written to) the pattern store.

use regex::Regex;
use tracing::warn;

/// Default context patterns (English, romanized Hindi, Devanagari, Gujarati).
/// Matched case-insensitively against the trimmed message.
pub const DEFAULT_CONTEXT_PATTERNS: &[&str] = &[
    // Bare list selections
    r"^\d{1,2}$",
    // Pagination
    r"^(more|next|next page|show more|aur|aur dikhao|aage|agla|agla page|aur batao|vadhu|aagal)$",
    r"^(page|panna|pannu)\s*\d+$",
    r"^(और|अगला|आगे|अगला पेज|વધુ|આગળ)$",
    // Third-person references
    r"\b(him|her|them|his|hers|their|theirs|same|uska|uski|unka|unki|iska|iski|wahi|vahi|tenu|temnu)\b",
    r"(उसका|उसकी|उनका|इसका|वही|તેનું|એનું)",
    // Bare affirmatives
    r"^(yes|yeah|yep|ok|okay|sure|haan|han|ha|haa|ji|haan ji|ji haan|theek hai|thik hai|ho)$",
    r"^(हाँ|हां|जी|ठीक है|હા|હો)$",
];

/// Flags messages whose meaning depends on prior conversation turns
#[derive(Debug, Clone)]
pub struct ContextDetector {
    patterns: Vec<Regex>,
}

impl ContextDetector {
    /// Compile `sources` case-insensitively. Invalid sources are skipped with
    /// a warning.
    pub fn new<S: AsRef<str>>(sources: &[S]) -> Self {
        let patterns = sources
            .iter()
            .filter_map(|source| {
                let source = source.as_ref();
                match Regex::new(&format!("(?i){}", source)) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("Ignoring invalid context pattern {:?}: {}", source, e);
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_context_dependent(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.patterns.iter().any(|re| re.is_match(trimmed))
    }
}

impl Default for ContextDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_PATTERNS)
    }
}
