//! Intent and resolution types shared by every tier.
//!
//! `Intent` is the wire form exchanged with the pattern store and the
//! external fallback. `IntentKind` is the tagged view the pipeline branches
//! on, so nothing downstream compares against sentinel strings.

use crate::error::ResolverError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action name reserved for "could not resolve".
pub const UNKNOWN_ACTION: &str = "unknown";

/// Parameter bag attached to an intent.
pub type Params = Map<String, Value>;

/// A resolved application intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    #[serde(default)]
    pub skill_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub suggested_reply: Option<String>,
}

/// Tagged view over an [`Intent`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntentKind<'a> {
    Actionable {
        skill_id: &'a str,
        action: &'a str,
        params: &'a Params,
    },
    Unknown {
        suggested_reply: Option<&'a str>,
    },
}

impl Intent {
    pub fn new(skill_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            skill_id: Some(skill_id.into()),
            action: action.into(),
            params: Params::new(),
            suggested_reply: None,
        }
    }

    /// An "unknown" intent carrying a clarification message.
    pub fn unknown(reply: impl Into<String>) -> Self {
        Self {
            skill_id: None,
            action: UNKNOWN_ACTION.to_string(),
            params: Params::new(),
            suggested_reply: Some(reply.into()),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.suggested_reply = Some(reply.into());
        self
    }

    /// Actionable means a skill is named and the action is not "unknown".
    pub fn kind(&self) -> IntentKind<'_> {
        match self.skill_id.as_deref() {
            Some(skill_id) if self.action != UNKNOWN_ACTION => IntentKind::Actionable {
                skill_id,
                action: &self.action,
                params: &self.params,
            },
            _ => IntentKind::Unknown {
                suggested_reply: self.suggested_reply.as_deref(),
            },
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self.kind(), IntentKind::Actionable { .. })
    }

    /// Returns the first parameter key that appears in `dynamic` (ASCII
    /// case-insensitive), if any.
    pub fn dynamic_param<'a>(&'a self, dynamic: &[String]) -> Option<&'a str> {
        self.params
            .keys()
            .find(|key| dynamic.iter().any(|d| d.eq_ignore_ascii_case(key)))
            .map(|key| key.as_str())
    }
}

/// Resolution strategy, tried strictly in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Exact normalized-key hit in the pattern store
    Exact = 1,
    /// Token-overlap match against stored keys
    Fuzzy = 2,
    /// External language-model fallback
    Fallback = 3,
}

impl Tier {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Tier {
    type Error = ResolverError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::Exact),
            2 => Ok(Tier::Fuzzy),
            3 => Ok(Tier::Fallback),
            other => Err(ResolverError::InvalidTier(other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.as_u8()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier {}", self.as_u8())
    }
}

/// Output of one `resolve_intent` call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub skill_id: Option<String>,
    pub action: String,
    pub params: Params,
    pub suggested_reply: Option<String>,
    pub tier: Tier,
    pub confidence: f64,
}

impl ResolutionResult {
    pub fn from_intent(intent: Intent, tier: Tier, confidence: f64) -> Self {
        Self {
            skill_id: intent.skill_id,
            action: intent.action,
            params: intent.params,
            suggested_reply: intent.suggested_reply,
            tier,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unknown(reply: impl Into<String>, tier: Tier) -> Self {
        Self::from_intent(Intent::unknown(reply), tier, 0.0)
    }

    pub fn is_actionable(&self) -> bool {
        self.skill_id.is_some() && self.action != UNKNOWN_ACTION
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior turn handed to the fallback for context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
