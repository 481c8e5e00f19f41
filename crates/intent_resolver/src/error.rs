//! Error types for the intent resolver.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Pattern store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pattern JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid resolution tier {0} (expected 1, 2 or 3)")]
    InvalidTier(u8),

    /// Failure reported by the external fallback. Display and source are the
    /// collaborator's own, so callers can match on the underlying error.
    #[error(transparent)]
    Fallback(anyhow::Error),

    #[error("Fallback resolver timed out after {0:?}")]
    FallbackTimeout(Duration),

    #[error("Config error: {0}")]
    Config(String),
}

impl ResolverError {
    pub fn code(&self) -> i32 {
        match self {
            ResolverError::Io(_) => -32006,
            ResolverError::Json(_) => -32700,
            ResolverError::InvalidTier(_) => -32602,
            ResolverError::Fallback(_) => -32002,
            ResolverError::FallbackTimeout(_) => -32003,
            ResolverError::Config(_) => -32004,
        }
    }

    /// True for errors raised by (or on behalf of) the external fallback.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            ResolverError::Fallback(_) | ResolverError::FallbackTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;
