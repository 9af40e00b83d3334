//! Model pricing for cost estimation.
//!
//! Prices are keyed by `"{kind}:{model}"` (for example `"openai:gpt-4o-mini"`)
//! and expressed per 1K tokens. Models without an entry fall back to a flat
//! per-kind rate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use citydesk_core::types::{ProviderKind, Usage};

/// Pricing information for a model (per 1K tokens).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Model identifier (e.g., "openai:gpt-4o").
    pub model_id: String,
    /// Cost per 1K input tokens in USD.
    pub input_cost_per_1k: f64,
    /// Cost per 1K output tokens in USD.
    pub output_cost_per_1k: f64,
}

impl ModelPricing {
    pub fn new(model_id: impl Into<String>, input: f64, output: f64) -> Self {
        Self {
            model_id: model_id.into(),
            input_cost_per_1k: input,
            output_cost_per_1k: output,
        }
    }

    /// Estimate cost for a request.
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 / 1000.0) * self.input_cost_per_1k;
        let output_cost = (output_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        input_cost + output_cost
    }
}

/// Registry of model pricing information.
pub struct PricingRegistry {
    models: HashMap<String, ModelPricing>,
}

impl PricingRegistry {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Create with default OpenAI/Anthropic/Gemini pricing.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(ModelPricing::new("openai:gpt-4o-mini", 0.00015, 0.0006));
        registry.register(ModelPricing::new("openai:gpt-4o", 0.0025, 0.01));
        registry.register(ModelPricing::new("openai:gpt-4-turbo", 0.01, 0.03));

        registry.register(ModelPricing::new("anthropic:claude-3-5-haiku-latest", 0.0008, 0.004));
        registry.register(ModelPricing::new("anthropic:claude-3-5-sonnet-latest", 0.003, 0.015));

        registry.register(ModelPricing::new("gemini:gemini-2.0-flash", 0.0001, 0.0004));
        registry.register(ModelPricing::new("gemini:gemini-1.5-pro", 0.00125, 0.005));

        registry
    }

    /// Register a model's pricing.
    pub fn register(&mut self, pricing: ModelPricing) {
        self.models.insert(pricing.model_id.clone(), pricing);
    }

    /// Get pricing for a model.
    pub fn get(&self, model_id: &str) -> Option<&ModelPricing> {
        self.models.get(model_id)
    }

    /// Pricing for `model` of backend `kind`, or the flat rate of the kind.
    pub fn lookup(&self, kind: ProviderKind, model: &str) -> ModelPricing {
        let key = format!("{}:{}", kind, model);
        if let Some(pricing) = self.models.get(&key) {
            return pricing.clone();
        }
        let flat = match kind {
            ProviderKind::OpenAi => 0.02,
            ProviderKind::Anthropic | ProviderKind::Gemini => 0.01,
            ProviderKind::Mock => 0.0,
        };
        ModelPricing::new(key, flat, flat)
    }

    /// Estimated cost of one call.
    pub fn estimate(&self, kind: ProviderKind, model: &str, usage: &Usage) -> f64 {
        self.lookup(kind, model)
            .estimate_cost(usage.prompt_tokens, usage.completion_tokens)
    }
}

impl Default for PricingRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
