//! `DenyEntry` (spec §3): a seed combination the Seed Guardrails (§4.3)
//! rejected previously and will not retry for 24 hours.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenyEntry {
    pub combination_fingerprint: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub seed_count: usize,
    pub negative_seed_count: usize,
}

impl DenyEntry {
    pub fn new(
        combination_fingerprint: String,
        reason: impl Into<String>,
        seed_count: usize,
        negative_seed_count: usize,
    ) -> Self {
        Self {
            combination_fingerprint,
            reason: reason.into(),
            timestamp: Utc::now(),
            seed_count,
            negative_seed_count,
        }
    }
}
