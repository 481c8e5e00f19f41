//! Tiered intent resolution.
//!
//! Per message, strictly in order, stopping at the first success:
//!
//! 1. Correction trigger: forget the previously resolved key.
//! 2. Context-dependent message: skip the cache, ask the fallback.
//! 3. Normalize; an empty key is answered with "unknown".
//! 4. Tier 1: exact key in the pattern store.
//! 5. Tier 2: best Jaccard match at or above the threshold.
//! 6. Tier 3: external fallback; actionable results without dynamic
//!    parameters are learned under the normalized key.
//!
//! Only tier 3 can suspend. It is bounded by the configured timeout and is
//! cancelled when the caller drops the future.

use crate::config::ResolverConfig;
use crate::context::ContextDetector;
use crate::error::{ResolverError, Result};
use crate::fallback::{FallbackRequest, FallbackResolver};
use crate::feedback::FeedbackHandler;
use crate::fuzzy::find_best_match;
use crate::intent::{ChatTurn, Intent, IntentKind, Params, ResolutionResult, Tier};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::normalizer::Normalizer;
use crate::pattern_store::PatternStore;
use crate::transliteration::TransliterationMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Action returned when a correction is acknowledged
pub const CORRECTION_ACTION: &str = "correction_acknowledged";

pub const CORRECTION_REPLY: &str =
    "Sorry about that. I've forgotten that answer. Could you tell me again what you need?";

pub const REPHRASE_REPLY: &str =
    "I couldn't work out what you meant. Could you rephrase your request?";

pub const EMPTY_MESSAGE_REPLY: &str = "I didn't catch that. What would you like to do?";

/// Confidence attached to an actionable fallback answer
pub const FALLBACK_CONFIDENCE: f64 = 0.8;

pub struct Resolver {
    normalizer: Normalizer,
    store: PatternStore,
    context: ContextDetector,
    feedback: FeedbackHandler,
    metrics: Metrics,
    fallback: Arc<dyn FallbackResolver>,
    threshold: f64,
    fallback_enabled: bool,
    fallback_timeout: Duration,
    dynamic_params: Vec<String>,
    /// Key of the last cacheable resolution, target of the next correction
    last_key: Mutex<Option<String>>,
}

impl Resolver {
    /// Build from configuration: reads the knowledge document (the built-in
    /// one when no path is configured) and loads the pattern store from disk.
    pub fn new(config: ResolverConfig, fallback: Arc<dyn FallbackResolver>) -> Self {
        let transliterations = match config.knowledge_path.as_deref() {
            Some(path) => TransliterationMap::from_path(path),
            None => TransliterationMap::builtin(),
        };
        let store = PatternStore::open(&config.pattern_store_path, config.write_debounce());
        Self::from_parts(config, Normalizer::new(transliterations), store, fallback)
    }

    /// Build from already constructed parts. The store's own path wins over
    /// `config.pattern_store_path`.
    pub fn from_parts(
        config: ResolverConfig,
        normalizer: Normalizer,
        store: PatternStore,
        fallback: Arc<dyn FallbackResolver>,
    ) -> Self {
        let threshold = config.effective_threshold();
        info!(
            "Intent resolver ready: {} patterns, {} transliterations, threshold {}, fallback {}",
            store.size(),
            normalizer.transliteration_len(),
            threshold,
            if config.fallback_enabled { "enabled" } else { "disabled" }
        );
        Self {
            normalizer,
            store,
            context: ContextDetector::new(&config.context_patterns),
            feedback: FeedbackHandler::new(&config.correction_triggers),
            metrics: Metrics::new(),
            fallback,
            threshold,
            fallback_enabled: config.fallback_enabled,
            fallback_timeout: config.fallback_timeout(),
            dynamic_params: config.dynamic_params,
            last_key: Mutex::new(None),
        }
    }

    /// Resolve one chat message to an intent.
    ///
    /// Errors only come from the external fallback (failure or timeout);
    /// every local outcome, including "unknown", is an `Ok`.
    pub async fn resolve_intent(
        &self,
        text: &str,
        external_config: &serde_json::Value,
        auth_token: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<ResolutionResult> {
        if self.feedback.is_correction_trigger(text) {
            return Ok(self.handle_correction());
        }

        let request = FallbackRequest {
            text,
            external_config,
            auth_token,
            history,
        };

        if self.context.is_context_dependent(text) {
            debug!("Context-dependent message, bypassing pattern store");
            if !self.fallback_enabled {
                return Ok(ResolutionResult::unknown(REPHRASE_REPLY, Tier::Fallback));
            }
            let intent = self.call_fallback(request).await?;
            self.metrics.record(Tier::Fallback);
            return Ok(fallback_result(intent));
        }

        let key = self.normalizer.normalize(text);
        if key.is_empty() {
            debug!("Message normalized to nothing");
            return Ok(ResolutionResult::unknown(EMPTY_MESSAGE_REPLY, Tier::Exact));
        }

        if let Some(entry) = self.store.get(&key) {
            debug!("Tier 1 hit for {:?}", key);
            self.store.record_hit(&key);
            self.metrics.record(Tier::Exact);
            self.set_last_key(Some(key));
            return Ok(ResolutionResult::from_intent(entry.intent, Tier::Exact, 1.0));
        }

        if let Some(found) = find_best_match(&key, &self.store.get_all(), self.threshold) {
            debug!(
                "Tier 2 hit for {:?}: {:?} at {:.3}",
                key, found.key, found.confidence
            );
            self.store.record_hit(&found.key);
            self.metrics.record(Tier::Fuzzy);
            self.set_last_key(Some(found.key));
            return Ok(ResolutionResult::from_intent(
                found.entry.intent,
                Tier::Fuzzy,
                found.confidence,
            ));
        }

        if !self.fallback_enabled {
            debug!("No local match for {:?} and fallback disabled", key);
            return Ok(ResolutionResult::unknown(REPHRASE_REPLY, Tier::Fallback));
        }

        debug!("No local match for {:?}, escalating to fallback", key);
        let intent = self.call_fallback(request).await?;
        self.metrics.record(Tier::Fallback);
        self.learn(&key, &intent);
        Ok(fallback_result(intent))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.store.size())
    }

    pub fn export_patterns(&self) -> Result<String> {
        self.store.export_json()
    }

    pub fn import_patterns(&self, json: &str) -> Result<usize> {
        self.store.import_json(json)
    }

    /// Write pending store changes now. Call at shutdown.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn last_resolved_key(&self) -> Option<String> {
        self.last_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_key(&self, key: Option<String>) {
        *self.last_key.lock().unwrap_or_else(PoisonError::into_inner) = key;
    }

    fn handle_correction(&self) -> ResolutionResult {
        let previous = self
            .last_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous {
            Some(key) if self.store.remove(&key) => {
                info!("Correction: forgot learned pattern {:?}", key)
            }
            Some(key) => debug!("Correction: pattern {:?} already gone", key),
            None => debug!("Correction with nothing to forget"),
        }
        self.metrics.record_correction();

        let ack = Intent {
            skill_id: None,
            action: CORRECTION_ACTION.to_string(),
            params: Params::new(),
            suggested_reply: Some(CORRECTION_REPLY.to_string()),
        };
        ResolutionResult::from_intent(ack, Tier::Exact, 1.0)
    }

    async fn call_fallback(&self, request: FallbackRequest<'_>) -> Result<Intent> {
        match tokio::time::timeout(self.fallback_timeout, self.fallback.resolve(request)).await {
            Ok(Ok(intent)) => Ok(intent),
            Ok(Err(e)) => Err(ResolverError::Fallback(e)),
            Err(_) => Err(ResolverError::FallbackTimeout(self.fallback_timeout)),
        }
    }

    /// Memorize a fallback answer under `key` when it is actionable and
    /// carries no per-query parameters.
    fn learn(&self, key: &str, intent: &Intent) {
        match intent.kind() {
            IntentKind::Actionable { skill_id, action, .. } => {
                if let Some(param) = intent.dynamic_param(&self.dynamic_params) {
                    debug!("Not learning {:?}: dynamic parameter {:?}", key, param);
                    self.set_last_key(None);
                    return;
                }
                self.store.put(key, intent.clone());
                info!("Learned pattern {:?} -> {}/{}", key, skill_id, action);
                self.set_last_key(Some(key.to_string()));
            }
            IntentKind::Unknown { .. } => self.set_last_key(None),
        }
    }
}

fn fallback_result(intent: Intent) -> ResolutionResult {
    let confidence = if intent.is_actionable() {
        FALLBACK_CONFIDENCE
    } else {
        0.0
    };
    ResolutionResult::from_intent(intent, Tier::Fallback, confidence)
}
