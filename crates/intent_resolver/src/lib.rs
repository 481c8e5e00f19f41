//! Local intent resolution for chat messages.
//!
//! Routes free text to `(skill, action, params)` through a learned pattern
//! cache and token-overlap matching, escalating to an external language
//! model only when the local tiers come up empty. Answers from the external
//! model are learned so the next similar message stays local.

pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod feedback;
pub mod fuzzy;
pub mod intent;
pub mod metrics;
pub mod normalizer;
pub mod pattern_store;
pub mod resolver;
pub mod transliteration;

pub use config::{validate_threshold, ResolverConfig, DEFAULT_CONFIDENCE_THRESHOLD};
pub use context::ContextDetector;
pub use error::{ResolverError, Result};
pub use fallback::{
    DisabledFallback, FallbackRequest, FallbackResolver, ScriptedFallback, ScriptedReply,
};
pub use feedback::FeedbackHandler;
pub use fuzzy::{find_best_match, jaccard_similarity, FuzzyMatch};
pub use intent::{ChatRole, ChatTurn, Intent, IntentKind, Params, ResolutionResult, Tier};
pub use metrics::{Metrics, MetricsSnapshot};
pub use normalizer::{canonicalize, tokenize, Normalizer};
pub use pattern_store::{LearningEntry, PatternStore, PatternStoreFile};
pub use resolver::Resolver;
pub use transliteration::TransliterationMap;

/// Knowledge document shipped with the crate
pub const BUILTIN_KNOWLEDGE: &str = include_str!("../knowledge/transliterations.md");
