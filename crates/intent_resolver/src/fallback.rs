//! External fallback seam (tier 3).
//!
//! The resolver only knows this trait. Production wires in a language-model
//! client; tests use `ScriptedFallback`, which answers from a script and
//! records every call.

use crate::intent::{ChatTurn, Intent};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Everything the fallback gets to see for one message
#[derive(Debug, Clone, Copy)]
pub struct FallbackRequest<'a> {
    /// The raw, un-normalized message
    pub text: &'a str,
    /// Opaque per-deployment settings (endpoint, model, business context)
    pub external_config: &'a serde_json::Value,
    pub auth_token: Option<&'a str>,
    pub history: &'a [ChatTurn],
}

#[async_trait]
pub trait FallbackResolver: Send + Sync {
    /// Resolve a message the local tiers could not. Errors are surfaced to
    /// the resolver's caller unchanged.
    async fn resolve(&self, request: FallbackRequest<'_>) -> anyhow::Result<Intent>;
}

/// Fallback for deployments without an external resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledFallback;

#[async_trait]
impl FallbackResolver for DisabledFallback {
    async fn resolve(&self, _request: FallbackRequest<'_>) -> anyhow::Result<Intent> {
        Err(anyhow!("no external fallback resolver configured"))
    }
}

/// Scripted reply for [`ScriptedFallback`]
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Intent(Intent),
    Fail(String),
    /// Sleep before answering, to exercise timeouts
    Delayed(Duration, Intent),
}

/// Deterministic fallback for tests
///
/// Replies are looked up by exact message text first, then taken from a
/// queue, then the default reply is used.
pub struct ScriptedFallback {
    by_text: HashMap<String, ScriptedReply>,
    queue: Mutex<VecDeque<ScriptedReply>>,
    default_reply: ScriptedReply,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedFallback {
    /// Every unscripted message resolves to "unknown".
    pub fn new() -> Self {
        Self {
            by_text: HashMap::new(),
            queue: Mutex::new(VecDeque::new()),
            default_reply: ScriptedReply::Intent(Intent::unknown(
                "Sorry, I didn't understand that.",
            )),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every unscripted message resolves to `intent`.
    pub fn always(intent: Intent) -> Self {
        Self::new().with_default(ScriptedReply::Intent(intent))
    }

    /// Every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new().with_default(ScriptedReply::Fail(message.into()))
    }

    pub fn with_default(mut self, reply: ScriptedReply) -> Self {
        self.default_reply = reply;
        self
    }

    pub fn on(mut self, text: impl Into<String>, intent: Intent) -> Self {
        self.by_text.insert(text.into(), ScriptedReply::Intent(intent));
        self
    }

    pub fn on_reply(mut self, text: impl Into<String>, reply: ScriptedReply) -> Self {
        self.by_text.insert(text.into(), reply);
        self
    }

    pub fn then(self, reply: ScriptedReply) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    /// Texts received, in call order.
    pub fn seen_texts(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_reply(&self, text: &str) -> ScriptedReply {
        if let Some(reply) = self.by_text.get(text) {
            return reply.clone();
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

impl Default for ScriptedFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FallbackResolver for ScriptedFallback {
    async fn resolve(&self, request: FallbackRequest<'_>) -> anyhow::Result<Intent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.text.to_string());

        match self.next_reply(request.text) {
            ScriptedReply::Intent(intent) => Ok(intent),
            ScriptedReply::Fail(message) => Err(anyhow!(message)),
            ScriptedReply::Delayed(delay, intent) => {
                tokio::time::sleep(delay).await;
                Ok(intent)
            }
        }
    }
}
