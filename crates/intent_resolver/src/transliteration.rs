//! Transliteration map built from the knowledge document.
//!
//! The document is line oriented. Only lines shaped like
//!
//! ```text
//! - "khata" / "khaata" = ledger (account book)
//! ```
//!
//! contribute entries: every quoted token on the left maps to the keyword on
//! the right. The keyword is the text before any parenthetical note or `/`
//! alternative. Everything else in the document is ignored.

use crate::normalizer::canonicalize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Read-only token/phrase -> English keyword map
#[derive(Debug, Clone, Default)]
pub struct TransliterationMap {
    entries: HashMap<String, String>,
}

impl TransliterationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a knowledge document. Lines that do not match the entry shape
    /// are skipped.
    pub fn from_document(document: &str) -> Self {
        let mut map = Self::new();
        for line in document.lines() {
            if let Some((tokens, keyword)) = parse_entry_line(line) {
                for token in tokens {
                    map.insert(&token, &keyword);
                }
            }
        }
        map.resolve_chains();
        debug!("Built transliteration map with {} entries", map.len());
        map
    }

    /// Map built from the knowledge document shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_document(crate::BUILTIN_KNOWLEDGE)
    }

    /// Load the knowledge document from disk. A missing or unreadable file
    /// yields an empty map.
    pub fn from_path(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(document) => {
                let map = Self::from_document(&document);
                info!(
                    "Loaded {} transliterations from {}",
                    map.len(),
                    path.display()
                );
                map
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Knowledge document {} not found, transliteration disabled",
                    path.display()
                );
                Self::new()
            }
            Err(e) => {
                warn!(
                    "Failed to read knowledge document {}: {}",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    /// Insert one mapping. Both sides are canonicalized; empty sides and
    /// identity mappings are dropped.
    pub fn insert(&mut self, token: &str, keyword: &str) {
        let token = canonicalize(token);
        let keyword = canonicalize(keyword);
        if token.is_empty() || keyword.is_empty() || token == keyword {
            return;
        }
        self.entries.insert(token, keyword);
    }

    /// Point every token at the end of its keyword chain and drop entries
    /// that can never settle: members of a cycle, and entries whose keyword
    /// shares a word with some key. Afterwards one transliteration pass is
    /// final.
    pub fn resolve_chains(&mut self) {
        let mut resolved = HashMap::with_capacity(self.entries.len());
        for (token, keyword) in &self.entries {
            match self.final_target(token) {
                Some(target) => {
                    resolved.insert(token.clone(), target);
                }
                None => warn!(
                    "Dropping transliteration {:?} -> {:?}: keyword cycle",
                    token, keyword
                ),
            }
        }
        self.entries = resolved;

        loop {
            let key_words: HashSet<&str> =
                self.entries.keys().flat_map(|k| k.split(' ')).collect();
            let clashing: Vec<String> = self
                .entries
                .iter()
                .filter(|(_, keyword)| keyword.split(' ').any(|w| key_words.contains(w)))
                .map(|(token, _)| token.clone())
                .collect();
            if clashing.is_empty() {
                break;
            }
            for token in clashing {
                if let Some(keyword) = self.entries.remove(&token) {
                    warn!(
                        "Dropping transliteration {:?} -> {:?}: keyword overlaps another entry",
                        token, keyword
                    );
                }
            }
        }
    }

    /// Follow `token` through the map. `None` when the chain loops.
    fn final_target(&self, token: &str) -> Option<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(token);
        let mut current = self.entries.get(token)?;
        while let Some(next) = self.entries.get(current.as_str()) {
            if !seen.insert(current.as_str()) {
                return None;
            }
            current = next;
        }
        Some(current.clone())
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split an entry line into its quoted tokens and the keyword. The `=`
/// separator is the first one after the quoted tokens, so quotes may
/// contain `=`.
fn parse_entry_line(line: &str) -> Option<(Vec<String>, String)> {
    let mut rest = line.trim().strip_prefix('-')?.trim_start();
    let mut tokens = Vec::new();
    loop {
        let (token, after) = rest.strip_prefix('"')?.split_once('"')?;
        let token = token.trim().to_lowercase();
        if !token.is_empty() {
            tokens.push(token);
        }
        rest = after.trim_start();
        match rest.strip_prefix('/') {
            Some(next) => rest = next.trim_start(),
            None => break,
        }
    }
    if tokens.is_empty() {
        return None;
    }

    let keyword = rest
        .strip_prefix('=')?
        .split(|c| c == '(' || c == '/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if keyword.is_empty() {
        return None;
    }

    Some((tokens, keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_token() {
        let map = TransliterationMap::from_document(r#"- "khata" = ledger"#);
        assert_eq!(map.get("khata"), Some("ledger"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_parse_alternatives_and_notes() {
        let doc = r#"
# Vocabulary
- "bakaya" / "baki" / "baaki" = outstanding / pending (amount due)
- "Bikri" = sales (revenue)
"#;
        let map = TransliterationMap::from_document(doc);
        assert_eq!(map.get("bakaya"), Some("outstanding"));
        assert_eq!(map.get("baki"), Some("outstanding"));
        assert_eq!(map.get("baaki"), Some("outstanding"));
        assert_eq!(map.get("bikri"), Some("sales"));
    }

    #[test]
    fn test_phrase_tokens() {
        let map = TransliterationMap::from_document(r#"- "kitna baki hai" = outstanding balance"#);
        assert_eq!(map.get("kitna baki hai"), Some("outstanding balance"));
    }

    #[test]
    fn test_identity_mapping_skipped() {
        let map = TransliterationMap::from_document(r#"- "ledger" / "khata" = Ledger"#);
        assert_eq!(map.get("ledger"), None);
        assert_eq!(map.get("khata"), Some("ledger"));
    }

    #[test]
    fn test_non_entry_lines_ignored() {
        let doc = "Some prose = not an entry\n- no quotes = nothing\n-\"x\" =\n";
        let map = TransliterationMap::from_document(doc);
        assert!(map.is_empty());
    }

    #[test]
    fn test_missing_document_is_empty() {
        let map = TransliterationMap::from_path(Path::new("/nonexistent/knowledge.md"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_quoted_token_may_contain_equals() {
        let doc = "- \"a=b\" / \"c\" = x\n- \"bill\" = invoice (said \"bil\")\n";
        let map = TransliterationMap::from_document(doc);
        assert_eq!(map.get("a=b"), Some("x"));
        assert_eq!(map.get("c"), Some("x"));
        assert_eq!(map.get("bill"), Some("invoice"));
    }

    #[test]
    fn test_long_chain_points_at_final_keyword() {
        let doc = "- \"a\" = b\n- \"b\" = c\n- \"c\" = d\n- \"d\" = e\n- \"e\" = f\n";
        let map = TransliterationMap::from_document(doc);
        for token in ["a", "b", "c", "d", "e"] {
            assert_eq!(map.get(token), Some("f"), "for {token:?}");
        }
    }

    #[test]
    fn test_cycles_are_dropped() {
        let doc = "- \"haan\" = yes\n- \"yes\" = ok\n- \"ok\" = haan\n- \"hmm\" = haan\n- \"khata\" = ledger\n";
        let map = TransliterationMap::from_document(doc);
        assert_eq!(map.get("haan"), None);
        assert_eq!(map.get("yes"), None);
        assert_eq!(map.get("ok"), None);
        assert_eq!(map.get("hmm"), None);
        assert_eq!(map.get("khata"), Some("ledger"));
    }

    #[test]
    fn test_keyword_overlapping_a_key_is_dropped() {
        let mut map = TransliterationMap::new();
        map.insert("a b", "x");
        map.insert("x c", "y");
        map.resolve_chains();
        assert_eq!(map.get("a b"), None);
        assert_eq!(map.get("x c"), Some("y"));
    }

    #[test]
    fn test_builtin_map_loads() {
        let map = TransliterationMap::builtin();
        assert_eq!(map.get("khata"), Some("ledger"));
        assert_eq!(map.get("is mahine"), Some("this month"));
    }
}
