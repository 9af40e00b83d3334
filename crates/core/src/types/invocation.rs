use serde::{Deserialize, Serialize};

use crate::error::{Error, ProviderFailure};

// =============================================================================
// Invocation Types
// =============================================================================

/// Token usage and cost of one provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Estimated cost in USD.
    #[serde(default)]
    pub cost_usd: f64,
}

/// Raw reply of a backend, before the gateway tags it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub text: String,
    pub usage: Usage,
}

/// Outcome of one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Provider that served (or failed) the call.
    pub provider: String,
    /// Model used.
    pub model: String,
    /// Generated text, empty on failure.
    pub output: String,
    /// Usage counters.
    pub usage: Usage,
    /// Wall-clock latency.
    pub latency_ms: u64,
    /// Whether the call produced output.
    pub success: bool,
    /// Failure detail when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderFailure>,
}

impl InvocationResult {
    /// Build a failed result for the given error.
    pub fn failed(provider: impl Into<String>, model: impl Into<String>, latency_ms: u64, error: &Error) -> Self {
        let provider = provider.into();
        Self {
            error: Some(ProviderFailure::from_error(provider.clone(), error)),
            provider,
            model: model.into(),
            output: String::new(),
            usage: Usage::default(),
            latency_ms,
            success: false,
        }
    }
}

/// Result of a fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackOutcome {
    /// Result of the winning provider.
    pub result: InvocationResult,
    /// Whether a provider other than the first was used.
    pub fallback_used: bool,
    /// Failures before the winner, in attempt order.
    pub failures: Vec<ProviderFailure>,
}

/// Agreement signal over successful cross-validation results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    /// Mean pairwise similarity in [0, 1]; `None` with fewer than two answers.
    pub score: Option<f64>,
    /// All successful answers are identical after normalization.
    pub unanimous: bool,
    /// Number of pairs compared.
    pub compared_pairs: usize,
}

/// Result of a cross-validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    /// One entry per provider, in request order.
    pub results: Vec<InvocationResult>,
    pub agreement: Agreement,
    pub successful: usize,
    pub failed: usize,
}
