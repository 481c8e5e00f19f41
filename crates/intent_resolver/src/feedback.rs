//! Correction triggers: "that was wrong" messages.

/// Default trigger words meaning "wrong" (English, Hindi, Gujarati).
pub const DEFAULT_CORRECTION_TRIGGERS: &[&str] = &[
    "wrong",
    "incorrect",
    "not this",
    "galat",
    "galat hai",
    "ghalat",
    "galat jawab",
    "गलत",
    "गलत है",
    "khotu",
    "khotu che",
    "ખોટું",
];

/// Recognizes messages that reject the previous answer
#[derive(Debug, Clone)]
pub struct FeedbackHandler {
    triggers: Vec<String>,
}

impl FeedbackHandler {
    pub fn new<S: AsRef<str>>(triggers: &[S]) -> Self {
        Self {
            triggers: triggers
                .iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Exact match after trimming and lowercasing; "wrong number" is not a
    /// correction.
    pub fn is_correction_trigger(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return false;
        }
        self.triggers.iter().any(|t| *t == text)
    }
}

impl Default for FeedbackHandler {
    fn default() -> Self {
        Self::new(DEFAULT_CORRECTION_TRIGGERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_triggers() {
        let f = FeedbackHandler::default();
        assert!(f.is_correction_trigger("wrong"));
        assert!(f.is_correction_trigger("  Galat "));
        assert!(f.is_correction_trigger("गलत"));
        assert!(f.is_correction_trigger("WRONG"));
    }

    #[test]
    fn test_requires_exact_match() {
        let f = FeedbackHandler::default();
        assert!(!f.is_correction_trigger("wrong number"));
        assert!(!f.is_correction_trigger("this is wrong?"));
        assert!(!f.is_correction_trigger(""));
        assert!(!f.is_correction_trigger("   "));
    }

    #[test]
    fn test_custom_triggers_are_normalized() {
        let f = FeedbackHandler::new(&["  Nope ", ""]);
        assert!(f.is_correction_trigger("nope"));
        assert!(!f.is_correction_trigger("wrong"));
    }
}
