//! Message normalization into pattern-store keys.
//!
//! Pipeline: lowercase, strip punctuation, split on whitespace, transliterate
//! with greedy longest-match (phrases of up to four words before single
//! words), join with single spaces. The result is idempotent: normalizing a
//! normalized key returns it unchanged.

use crate::transliteration::TransliterationMap;
use std::collections::BTreeSet;

/// Characters removed before matching
pub const STRIPPED_PUNCTUATION: &[char] = &[
    '.', ',', '?', '!', ';', ':', '"', '\'', '(', ')', '[', ']', '{', '}',
];

/// Longest phrase (in words) tried against the transliteration map
const MAX_PHRASE_WORDS: usize = 4;

/// Lowercase, drop punctuation, collapse whitespace. No transliteration.
pub fn canonicalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a normalized message into its distinct tokens.
pub fn tokenize(normalized: &str) -> BTreeSet<String> {
    normalized.split_whitespace().map(str::to_string).collect()
}

/// Normalizer holding the transliteration map for one resolver
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    transliterations: TransliterationMap,
}

impl Normalizer {
    pub fn new(mut transliterations: TransliterationMap) -> Self {
        transliterations.resolve_chains();
        Self { transliterations }
    }

    pub fn transliteration_len(&self) -> usize {
        self.transliterations.len()
    }

    /// Produce the pattern-store key for a raw message.
    ///
    /// The map is closed (no keyword shares a word with a key), so the
    /// output of one pass contains nothing a second pass would rewrite.
    pub fn normalize(&self, text: &str) -> String {
        let canonical = canonicalize(text);
        if self.transliterations.is_empty() {
            return canonical;
        }
        self.transliterate(&canonical)
    }

    /// Greedy left-to-right pass over canonical text.
    fn transliterate(&self, canonical: &str) -> String {
        let words: Vec<&str> = canonical.split(' ').filter(|w| !w.is_empty()).collect();
        let mut out: Vec<&str> = Vec::with_capacity(words.len());
        let mut i = 0;

        while i < words.len() {
            let longest = MAX_PHRASE_WORDS.min(words.len() - i);
            let phrase_hit = (2..=longest).rev().find_map(|width| {
                let phrase = words[i..i + width].join(" ");
                self.transliterations.get(&phrase).map(|kw| (kw, width))
            });

            match phrase_hit {
                Some((keyword, width)) => {
                    out.push(keyword);
                    i += width;
                }
                None => {
                    out.push(self.transliterations.get(words[i]).unwrap_or(words[i]));
                    i += 1;
                }
            }
        }

        out.join(" ")
    }
}
