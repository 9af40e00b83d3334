//! Provider gateway: registry of backends with usage tracking.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use citydesk_core::{
    traits::LlmProvider,
    types::{InvocationResult, ProviderDescriptor, ProviderUsage, Usage},
    Error, Result,
};
use citydesk_governance::{track_invocation, track_tokens};

use crate::pricing::{ModelPricing, PricingRegistry};

/// Usage counters of one provider.
#[derive(Debug, Default)]
pub struct ProviderStatus {
    /// Total calls, successful or not.
    pub calls: AtomicU64,
    /// Failed calls.
    pub failures: AtomicU64,
    pub prompt_tokens: AtomicU64,
    pub completion_tokens: AtomicU64,
    /// Accumulated estimated cost in USD.
    cost_usd: Mutex<f64>,
    /// Latency of the most recent call; `u64::MAX` until the first call.
    last_latency_ms: AtomicU64,
}

impl ProviderStatus {
    pub fn new() -> Self {
        Self {
            last_latency_ms: AtomicU64::new(u64::MAX),
            ..Default::default()
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, usage: &Usage, latency_ms: u64) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
        *self.cost_usd.lock().unwrap_or_else(|e| e.into_inner()) += usage.cost_usd;
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    /// Record a failed call.
    pub fn record_failure(&self, latency_ms: u64) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    /// Get failure rate.
    pub fn failure_rate(&self) -> f64 {
        let total = self.calls.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            self.failures.load(Ordering::Relaxed) as f64 / total as f64
        }
    }

    fn snapshot(&self, provider: &str) -> ProviderUsage {
        let prompt_tokens = self.prompt_tokens.load(Ordering::Relaxed);
        let completion_tokens = self.completion_tokens.load(Ordering::Relaxed);
        let last = self.last_latency_ms.load(Ordering::Relaxed);
        ProviderUsage {
            provider: provider.to_string(),
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_usd: *self.cost_usd.lock().unwrap_or_else(|e| e.into_inner()),
            last_latency_ms: (last != u64::MAX).then_some(last),
        }
    }
}

struct ProviderEntry {
    descriptor: ProviderDescriptor,
    client: Arc<dyn LlmProvider>,
    status: ProviderStatus,
}

/// Usage across all providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Per-provider counters, in fallback order.
    pub providers: Vec<ProviderUsage>,
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

/// Descriptor, pricing and usage of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    #[serde(flatten)]
    pub descriptor: ProviderDescriptor,
    pub pricing: ModelPricing,
    pub usage: ProviderUsage,
    pub failure_rate: f64,
}

/// Uniform front for every registered backend.
///
/// Each call is bounded by the gateway timeout and is never retried here;
/// retry policy belongs to the invocation strategies.
pub struct ProviderGateway {
    providers: DashMap<String, ProviderEntry>,
    pricing: PricingRegistry,
    timeout: Duration,
}

impl ProviderGateway {
    pub fn new(timeout: Duration) -> Self {
        Self {
            providers: DashMap::new(),
            pricing: PricingRegistry::with_defaults(),
            timeout,
        }
    }

    /// Register a backend under `descriptor.id`, replacing any previous one.
    pub fn register(&self, descriptor: ProviderDescriptor, client: Arc<dyn LlmProvider>) {
        tracing::info!(
            provider = %descriptor.id,
            kind = %descriptor.kind,
            model = %descriptor.model,
            priority = descriptor.priority,
            "Provider registered"
        );
        self.providers.insert(
            descriptor.id.clone(),
            ProviderEntry {
                descriptor,
                client,
                status: ProviderStatus::new(),
            },
        );
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn descriptor(&self, provider_id: &str) -> Option<ProviderDescriptor> {
        self.providers
            .get(provider_id)
            .map(|entry| entry.descriptor.clone())
    }

    /// Descriptors by priority, ties broken by declaration order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let mut descriptors: Vec<_> = self
            .providers
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect();
        descriptors.sort_by_key(|d| (d.order_key(), d.id.clone()));
        descriptors
    }

    /// Provider ids in fallback order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.descriptors().into_iter().map(|d| d.id).collect()
    }

    /// Call one provider.
    ///
    /// Usage and latency are recorded whether the call succeeds or not.
    pub async fn invoke(
        &self,
        provider_id: &str,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<InvocationResult> {
        let (descriptor, client) = self
            .providers
            .get(provider_id)
            .map(|entry| (entry.descriptor.clone(), entry.client.clone()))
            .ok_or_else(|| Error::not_found(format!("provider '{}'", provider_id)))?;

        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, client.invoke(prompt, context)).await {
            Ok(result) => result,
            Err(_) => Err(Error::unavailable(
                provider_id,
                format!("timed out after {}ms", self.timeout.as_millis()),
            )),
        };
        let latency = start.elapsed();
        let latency_ms = latency.as_millis() as u64;

        match outcome {
            Ok(reply) => {
                let mut usage = reply.usage;
                if usage.cost_usd == 0.0 {
                    usage.cost_usd = self.pricing.estimate(descriptor.kind, &descriptor.model, &usage);
                }
                if let Some(entry) = self.providers.get(provider_id) {
                    entry.status.record_success(&usage, latency_ms);
                }
                track_invocation(provider_id, "success", latency.as_secs_f64());
                track_tokens(provider_id, usage.prompt_tokens, usage.completion_tokens);
                tracing::debug!(
                    provider = provider_id,
                    latency_ms = latency_ms,
                    total_tokens = usage.total_tokens,
                    "Provider call succeeded"
                );

                Ok(InvocationResult {
                    provider: descriptor.id,
                    model: descriptor.model,
                    output: reply.text,
                    usage,
                    latency_ms,
                    success: true,
                    error: None,
                })
            }
            Err(err) => {
                if let Some(entry) = self.providers.get(provider_id) {
                    entry.status.record_failure(latency_ms);
                }
                track_invocation(provider_id, err.code(), latency.as_secs_f64());
                tracing::warn!(
                    provider = provider_id,
                    latency_ms = latency_ms,
                    code = err.code(),
                    error = %err,
                    "Provider call failed"
                );
                Err(err)
            }
        }
    }

    /// Usage counters of every provider.
    pub fn usage_stats(&self) -> UsageReport {
        let providers: Vec<ProviderUsage> = self
            .provider_ids()
            .iter()
            .filter_map(|id| self.providers.get(id).map(|e| e.status.snapshot(id)))
            .collect();

        UsageReport {
            total_calls: providers.iter().map(|p| p.calls).sum(),
            total_tokens: providers.iter().map(|p| p.total_tokens).sum(),
            total_cost_usd: providers.iter().map(|p| p.cost_usd).sum(),
            providers,
        }
    }

    /// Descriptor, pricing and usage of one provider.
    pub fn provider_info(&self, provider_id: &str) -> Result<ProviderInfo> {
        let entry = self
            .providers
            .get(provider_id)
            .ok_or_else(|| Error::not_found(format!("provider '{}'", provider_id)))?;

        Ok(ProviderInfo {
            pricing: self
                .pricing
                .lookup(entry.descriptor.kind, &entry.descriptor.model),
            usage: entry.status.snapshot(provider_id),
            failure_rate: entry.status.failure_rate(),
            descriptor: entry.descriptor.clone(),
        })
    }
}
