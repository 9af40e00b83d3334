//! Invocation strategies: single call, fallback chain and cross-validation.
//!
//! Every provider call passes through the admission controller first; a denied
//! admission fails that call with `RateLimited` without waiting.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;

use citydesk_core::{
    types::{CrossValidation, FallbackOutcome, InvocationResult},
    Error, ProviderFailure, Result,
};
use citydesk_governance::AdmissionController;

use crate::agreement;
use crate::providers::ProviderGateway;

/// Endpoint name of completion calls in the admission controller.
pub const COMPLETION_ENDPOINT: &str = "completion";

/// Strategies built on the provider gateway and the admission controller.
pub struct InvocationStrategies {
    gateway: Arc<ProviderGateway>,
    admission: Arc<AdmissionController>,
    max_parallelism: usize,
}

impl InvocationStrategies {
    /// Every provider registered so far gets its completion bucket here, so
    /// quota stats and overrides see it before its first call.
    pub fn new(gateway: Arc<ProviderGateway>, admission: Arc<AdmissionController>) -> Self {
        for id in gateway.provider_ids() {
            if !admission.ensure_bucket(&id, COMPLETION_ENDPOINT) {
                tracing::warn!(provider = %id, "No rate limit for provider, its calls will be denied");
            }
        }
        Self {
            gateway,
            admission,
            max_parallelism: 4,
        }
    }

    /// Bound on concurrent calls during cross-validation.
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    pub fn gateway(&self) -> &Arc<ProviderGateway> {
        &self.gateway
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// One admission check, then one provider call.
    pub async fn single(
        &self,
        provider_id: &str,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<InvocationResult> {
        // Unknown ids must not create buckets from the default limit.
        if !self.gateway.contains(provider_id) {
            return Err(Error::not_found(format!("provider '{}'", provider_id)));
        }
        self.admission.acquire(provider_id, COMPLETION_ENDPOINT, 1)?;
        self.gateway.invoke(provider_id, prompt, context).await
    }

    fn resolve_order(&self, providers: &[String]) -> Result<Vec<String>> {
        if !providers.is_empty() {
            return Ok(providers.to_vec());
        }
        let ids = self.gateway.provider_ids();
        if ids.is_empty() {
            return Err(Error::invalid_request("no providers configured"));
        }
        Ok(ids)
    }

    /// Try providers in order until one succeeds.
    ///
    /// An empty list means every registered provider by priority. Any
    /// per-provider failure advances the chain; the outcome carries the
    /// failures that preceded the winner.
    pub async fn fallback(
        &self,
        providers: &[String],
        prompt: &str,
        context: Option<&str>,
    ) -> Result<FallbackOutcome> {
        let order = self.resolve_order(providers)?;
        self.run_chain(&order, prompt, context).await
    }

    /// Try `preferred` first, then every other provider by priority.
    pub async fn fallback_from(
        &self,
        preferred: &str,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<FallbackOutcome> {
        if !self.gateway.contains(preferred) {
            return Err(Error::not_found(format!("provider '{}'", preferred)));
        }
        let order: Vec<String> = std::iter::once(preferred.to_string())
            .chain(self.gateway.provider_ids().into_iter().filter(|id| id != preferred))
            .collect();
        self.run_chain(&order, prompt, context).await
    }

    async fn run_chain(
        &self,
        order: &[String],
        prompt: &str,
        context: Option<&str>,
    ) -> Result<FallbackOutcome> {
        let mut failures: Vec<ProviderFailure> = Vec::new();

        for (attempt, provider_id) in order.iter().enumerate() {
            match self.single(provider_id, prompt, context).await {
                Ok(result) => {
                    if attempt > 0 {
                        tracing::info!(
                            provider = %provider_id,
                            attempt = attempt + 1,
                            "Fallback provider succeeded"
                        );
                    }
                    return Ok(FallbackOutcome {
                        result,
                        fallback_used: attempt > 0,
                        failures,
                    });
                }
                Err(err) => {
                    if matches!(err, Error::ProviderRejected { .. }) {
                        tracing::warn!(
                            provider = %provider_id,
                            error = %err,
                            "Provider rejected request, trying next provider"
                        );
                    } else {
                        tracing::warn!(
                            provider = %provider_id,
                            code = err.code(),
                            error = %err,
                            "Provider failed, trying next provider"
                        );
                    }
                    failures.push(ProviderFailure::from_error(provider_id.as_str(), &err));
                }
            }
        }

        tracing::error!(attempts = failures.len(), "All providers exhausted");
        Err(Error::AllProvidersExhausted { failures })
    }

    /// Call every provider concurrently and compare the answers.
    ///
    /// Results come back in provider order, failed calls included. Fails only
    /// when no provider succeeds.
    pub async fn cross_validate(
        &self,
        providers: &[String],
        prompt: &str,
        context: Option<&str>,
    ) -> Result<CrossValidation> {
        let order = self.resolve_order(providers)?;

        let results: Vec<InvocationResult> = stream::iter(order)
            .map(|provider_id| async move {
                let start = Instant::now();
                match self.single(&provider_id, prompt, context).await {
                    Ok(result) => result,
                    Err(err) => {
                        let model = self
                            .gateway
                            .descriptor(&provider_id)
                            .map(|d| d.model)
                            .unwrap_or_default();
                        InvocationResult::failed(
                            provider_id,
                            model,
                            start.elapsed().as_millis() as u64,
                            &err,
                        )
                    }
                }
            })
            .buffered(self.max_parallelism)
            .collect()
            .await;

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;

        if successful == 0 {
            let failures = results.into_iter().filter_map(|r| r.error).collect();
            return Err(Error::AllProvidersExhausted { failures });
        }

        let outputs: Vec<&str> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.output.as_str())
            .collect();
        let agreement = agreement::score(&outputs);

        tracing::info!(
            successful = successful,
            failed = failed,
            score = ?agreement.score,
            "Cross-validation finished"
        );

        Ok(CrossValidation {
            results,
            agreement,
            successful,
            failed,
        })
    }
}
