//! Resolution counters by tier.
//!
//! All counters sit behind one lock so a snapshot always satisfies
//! `total == tier1 + tier2 + tier3`.

use crate::error::Result;
use crate::intent::Tier;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    total: u64,
    tier1: u64,
    tier2: u64,
    tier3: u64,
    corrections: u64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total: u64,
    pub tier1_hits: u64,
    pub tier2_hits: u64,
    pub tier3_hits: u64,
    pub corrections: u64,
    pub store_size: usize,
}

impl MetricsSnapshot {
    /// Share of resolutions served without the external fallback.
    pub fn local_hit_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.tier1_hits + self.tier2_hits) as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<Counters>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tier: Tier) {
        let mut c = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        match tier {
            Tier::Exact => c.tier1 += 1,
            Tier::Fuzzy => c.tier2 += 1,
            Tier::Fallback => c.tier3 += 1,
        }
        c.total += 1;
    }

    /// Record by raw tier number. Anything outside 1..=3 is a caller bug and
    /// is rejected without touching the counters.
    pub fn record_tier(&self, tier: u8) -> Result<()> {
        self.record(Tier::try_from(tier)?);
        Ok(())
    }

    pub fn record_correction(&self) {
        let mut c = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        c.corrections += 1;
    }

    pub fn snapshot(&self, store_size: usize) -> MetricsSnapshot {
        let c = *self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        MetricsSnapshot {
            total: c.total,
            tier1_hits: c.tier1,
            tier2_hits: c.tier2,
            tier3_hits: c.tier3,
            corrections: c.corrections,
            store_size,
        }
    }
}
