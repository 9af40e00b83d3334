use serde::{Deserialize, Serialize};

// =============================================================================
// Quota Types
// =============================================================================

/// Configured limit of a quota bucket: `refill_tokens` per `refill_period_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimit {
    /// Maximum tokens held.
    pub capacity: u64,
    /// Tokens added per refill period.
    pub refill_tokens: u64,
    /// Refill period in seconds.
    pub refill_period_secs: u64,
}

impl QuotaLimit {
    /// `requests` per minute, bursting up to the same amount.
    pub fn per_minute(requests: u64) -> Self {
        Self {
            capacity: requests,
            refill_tokens: requests,
            refill_period_secs: 60,
        }
    }

    /// Refill rate in tokens per second.
    pub fn refill_rate_per_sec(&self) -> f64 {
        if self.refill_period_secs == 0 {
            0.0
        } else {
            self.refill_tokens as f64 / self.refill_period_secs as f64
        }
    }
}

impl Default for QuotaLimit {
    fn default() -> Self {
        Self::per_minute(100)
    }
}

/// Monitoring snapshot of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub provider: String,
    pub endpoint: String,
    /// Effective capacity, including an active override.
    pub capacity: f64,
    /// Configured capacity.
    pub base_capacity: f64,
    pub available: f64,
    pub refill_rate_per_sec: f64,
    /// Share of effective capacity currently consumed.
    pub utilization_ratio: f64,
    /// Seconds until an active override expires.
    pub override_expires_in_secs: Option<f64>,
}
