//! Token-set fuzzy matching over stored pattern keys.
//!
//! Score is Jaccard similarity between token sets. Ties on score prefer the
//! more frequently used entry, then the smaller key, so the winner never
//! depends on hash-map iteration order.

use crate::normalizer::tokenize;
use crate::pattern_store::LearningEntry;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Best fuzzy candidate for a query
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub key: String,
    pub entry: LearningEntry,
    pub confidence: f64,
}

/// `|A ∩ B| / |A ∪ B|`, 0.0 when both sets are empty.
pub fn jaccard_similarity<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Find the stored entry most similar to `query` at or above `threshold`.
pub fn find_best_match(
    query: &str,
    entries: &[(String, LearningEntry)],
    threshold: f64,
) -> Option<FuzzyMatch> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(&String, &LearningEntry, f64)> = None;
    for (key, entry) in entries {
        let score = jaccard_similarity(&query_tokens, &tokenize(key));
        if score < threshold {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_key, best_entry, best_score)) => {
                match score.partial_cmp(&best_score).unwrap_or(Ordering::Equal) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => match entry.hit_count.cmp(&best_entry.hit_count) {
                        Ordering::Greater => true,
                        Ordering::Less => false,
                        Ordering::Equal => key < best_key,
                    },
                }
            }
        };
        if better {
            best = Some((key, entry, score));
        }
    }

    best.map(|(key, entry, confidence)| FuzzyMatch {
        key: key.clone(),
        entry: entry.clone(),
        confidence,
    })
}
