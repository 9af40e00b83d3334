//! Per-provider admission control.
//!
//! Every (provider, endpoint) pair owns a token bucket. Buckets refill lazily
//! from elapsed monotonic time whenever they are touched, so idle buckets
//! never miss refills and no background timer is needed. Token arithmetic is
//! done in micro-tokens with integer math, which keeps refill exact for
//! rational rates such as 5 tokens per 60 seconds.
//!
//! Each bucket sits behind its own mutex. The map only hands out `Arc`s to
//! buckets, so acquisitions on unrelated providers never contend.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use citydesk_core::{
    config::RateLimitConfig,
    types::{BucketStats, QuotaLimit},
    Error, Result,
};

const MICROS_PER_TOKEN: u64 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct BucketKey {
    provider: String,
    endpoint: String,
}

impl BucketKey {
    fn new(provider: &str, endpoint: &str) -> Self {
        Self {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
        }
    }
}

/// Temporary capacity increase.
#[derive(Debug, Clone, Copy)]
struct CapacityBoost {
    extra_micros: u64,
    expires_at: Instant,
}

/// Token bucket for one (provider, endpoint) pair.
#[derive(Debug)]
struct QuotaBucket {
    limit: QuotaLimit,
    /// Always within `[0, effective_capacity]`.
    available_micros: u64,
    last_refill: Instant,
    boost: Option<CapacityBoost>,
}

impl QuotaBucket {
    fn new(limit: QuotaLimit, now: Instant) -> Self {
        Self {
            limit,
            available_micros: limit.capacity.saturating_mul(MICROS_PER_TOKEN),
            last_refill: now,
            boost: None,
        }
    }

    fn base_capacity_micros(&self) -> u64 {
        self.limit.capacity.saturating_mul(MICROS_PER_TOKEN)
    }

    fn capacity_micros(&self) -> u64 {
        let extra = self.boost.map_or(0, |b| b.extra_micros);
        self.base_capacity_micros().saturating_add(extra)
    }

    /// Add refill for the time between `last_refill` and `until`.
    fn accrue(&mut self, until: Instant) {
        let elapsed = until.saturating_duration_since(self.last_refill);
        if until > self.last_refill {
            self.last_refill = until;
        }
        if self.limit.refill_tokens == 0 || self.limit.refill_period_secs == 0 {
            return;
        }

        let added = elapsed.as_nanos() * self.limit.refill_tokens as u128 * MICROS_PER_TOKEN as u128
            / (self.limit.refill_period_secs as u128 * NANOS_PER_SEC);
        let added = u64::try_from(added).unwrap_or(u64::MAX);
        self.available_micros = self
            .available_micros
            .saturating_add(added)
            .min(self.capacity_micros());
    }

    /// Bring the bucket up to `now`: expire a lapsed boost, then refill.
    fn advance(&mut self, now: Instant) {
        if let Some(boost) = self.boost {
            if boost.expires_at <= now {
                self.accrue(boost.expires_at);
                self.boost = None;
                self.available_micros = self.available_micros.min(self.base_capacity_micros());
            }
        }
        self.accrue(now);
    }

    fn try_take(&mut self, cost_micros: u64, now: Instant) -> bool {
        self.advance(now);
        if self.available_micros >= cost_micros {
            self.available_micros -= cost_micros;
            true
        } else {
            false
        }
    }

    fn stats(&self, key: &BucketKey, now: Instant) -> BucketStats {
        let capacity = self.capacity_micros() as f64 / MICROS_PER_TOKEN as f64;
        let available = self.available_micros as f64 / MICROS_PER_TOKEN as f64;
        BucketStats {
            provider: key.provider.clone(),
            endpoint: key.endpoint.clone(),
            capacity,
            base_capacity: self.limit.capacity as f64,
            available,
            refill_rate_per_sec: self.limit.refill_rate_per_sec(),
            utilization_ratio: if capacity > 0.0 {
                1.0 - available / capacity
            } else {
                1.0
            },
            override_expires_in_secs: self
                .boost
                .map(|b| b.expires_at.saturating_duration_since(now).as_secs_f64()),
        }
    }
}

/// Admission controller holding one quota bucket per (provider, endpoint).
pub struct AdmissionController {
    buckets: DashMap<BucketKey, Arc<Mutex<QuotaBucket>>>,
    /// Limit for buckets created on first use.
    default_limit: Option<QuotaLimit>,
}

impl AdmissionController {
    /// Create a controller. Without a default limit, undeclared buckets deny.
    pub fn new(default_limit: Option<QuotaLimit>) -> Self {
        Self {
            buckets: DashMap::new(),
            default_limit,
        }
    }

    /// Create a controller with the configured buckets.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let controller = Self::new(config.default_limit);
        for bucket in &config.buckets {
            controller.set_limit(&bucket.provider, &bucket.endpoint, bucket.limit);
        }
        controller
    }

    fn lock(bucket: &Mutex<QuotaBucket>) -> MutexGuard<'_, QuotaBucket> {
        // Bucket state stays consistent even if a holder panicked.
        bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declare or reconfigure a bucket.
    ///
    /// A reconfigured bucket keeps its current tokens, clamped to the new
    /// capacity.
    pub fn set_limit(&self, provider: &str, endpoint: &str, limit: QuotaLimit) {
        let now = Instant::now();
        let key = BucketKey::new(provider, endpoint);
        if let Some(existing) = self.buckets.get(&key).map(|b| b.value().clone()) {
            let mut bucket = Self::lock(&existing);
            bucket.advance(now);
            bucket.limit = limit;
            let cap = bucket.capacity_micros();
            bucket.available_micros = bucket.available_micros.min(cap);
        } else {
            self.buckets
                .insert(key, Arc::new(Mutex::new(QuotaBucket::new(limit, now))));
        }
        tracing::info!(
            provider = provider,
            endpoint = endpoint,
            capacity = limit.capacity,
            refill_tokens = limit.refill_tokens,
            refill_period_secs = limit.refill_period_secs,
            "Rate limit configured"
        );
    }

    /// Make sure `provider` has a bucket for `endpoint`, using the default
    /// limit when none is configured.
    pub fn ensure_bucket(&self, provider: &str, endpoint: &str) -> bool {
        self.bucket(provider, endpoint).is_some()
    }

    fn bucket(&self, provider: &str, endpoint: &str) -> Option<Arc<Mutex<QuotaBucket>>> {
        let key = BucketKey::new(provider, endpoint);
        if let Some(bucket) = self.buckets.get(&key) {
            return Some(bucket.value().clone());
        }
        let limit = self.default_limit?;
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(QuotaBucket::new(limit, Instant::now()))))
            .value()
            .clone();
        Some(bucket)
    }

    /// Take `cost` tokens if available. Never waits for a refill.
    ///
    /// Returns false and leaves the bucket untouched when the tokens are not
    /// there, or when the bucket is unknown and no default limit exists.
    pub fn try_acquire(&self, provider: &str, endpoint: &str, cost: u64) -> bool {
        let Some(bucket) = self.bucket(provider, endpoint) else {
            tracing::warn!(provider = provider, endpoint = endpoint, "No quota bucket, denying");
            metrics::counter!(
                "admission_decisions_total",
                "provider" => provider.to_string(),
                "outcome" => "unknown"
            )
            .increment(1);
            return false;
        };

        let granted = {
            let mut bucket = Self::lock(&bucket);
            bucket.try_take(cost.saturating_mul(MICROS_PER_TOKEN), Instant::now())
        };

        if granted {
            tracing::debug!(provider = provider, endpoint = endpoint, cost = cost, "Admission granted");
        } else {
            tracing::warn!(provider = provider, endpoint = endpoint, cost = cost, "Rate limit exceeded");
        }
        metrics::counter!(
            "admission_decisions_total",
            "provider" => provider.to_string(),
            "outcome" => if granted { "granted" } else { "denied" }
        )
        .increment(1);

        granted
    }

    /// [`try_acquire`](Self::try_acquire) as a `Result`.
    pub fn acquire(&self, provider: &str, endpoint: &str, cost: u64) -> Result<()> {
        if self.try_acquire(provider, endpoint, cost) {
            Ok(())
        } else {
            Err(Error::rate_limited(provider, endpoint))
        }
    }

    /// Snapshot of every bucket, or of one provider's buckets.
    pub fn stats(&self, provider: Option<&str>) -> Vec<BucketStats> {
        let now = Instant::now();
        let mut selected: Vec<(BucketKey, Arc<Mutex<QuotaBucket>>)> = self
            .buckets
            .iter()
            .filter(|entry| provider.map_or(true, |p| entry.key().provider == p))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        selected.sort_by(|a, b| a.0.cmp(&b.0));

        selected
            .into_iter()
            .map(|(key, bucket)| {
                let mut bucket = Self::lock(&bucket);
                bucket.advance(now);
                bucket.stats(&key, now)
            })
            .collect()
    }

    /// Whether any bucket belongs to `provider`.
    pub fn has_provider(&self, provider: &str) -> bool {
        self.buckets.iter().any(|entry| entry.key().provider == provider)
    }

    fn provider_buckets(&self, provider: &str) -> Vec<Arc<Mutex<QuotaBucket>>> {
        self.buckets
            .iter()
            .filter(|entry| entry.key().provider == provider)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Raise the capacity of every bucket of `provider` by `capacity_delta`
    /// for `ttl`. The extra tokens are credited at once; when the override
    /// lapses the bucket returns to its configured capacity.
    ///
    /// A new override replaces one that is still active.
    pub fn override_capacity(&self, provider: &str, capacity_delta: u64, ttl: Duration) -> Result<()> {
        if capacity_delta == 0 {
            return Err(Error::invalid_request("capacity delta must be positive"));
        }
        let buckets = self.provider_buckets(provider);
        if buckets.is_empty() {
            return Err(Error::not_found(format!("provider '{}'", provider)));
        }

        let now = Instant::now();
        let extra_micros = capacity_delta.saturating_mul(MICROS_PER_TOKEN);
        for bucket in buckets {
            let mut bucket = Self::lock(&bucket);
            bucket.advance(now);
            if bucket.boost.is_some() {
                // Drop the old boost before crediting the new one.
                bucket.boost = None;
                let base = bucket.base_capacity_micros();
                bucket.available_micros = bucket.available_micros.min(base);
            }
            bucket.boost = Some(CapacityBoost {
                extra_micros,
                expires_at: now + ttl,
            });
            let cap = bucket.capacity_micros();
            bucket.available_micros = bucket.available_micros.saturating_add(extra_micros).min(cap);
        }

        tracing::warn!(
            provider = provider,
            capacity_delta = capacity_delta,
            ttl_secs = ttl.as_secs_f64(),
            "Emergency rate limit override applied"
        );
        Ok(())
    }

    /// Refill buckets to capacity, for one provider or all of them.
    pub fn reset(&self, provider: Option<&str>) {
        let now = Instant::now();
        for entry in self.buckets.iter() {
            if provider.map_or(true, |p| entry.key().provider == p) {
                let mut bucket = Self::lock(entry.value());
                bucket.advance(now);
                bucket.available_micros = bucket.capacity_micros();
            }
        }
        tracing::info!(provider = ?provider, "Rate limits reset");
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(Some(QuotaLimit::default()))
    }
}
