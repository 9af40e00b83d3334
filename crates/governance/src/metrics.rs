//! Metrics implementation using Prometheus.

use citydesk_core::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Track one provider call (count and latency).
pub fn track_invocation(provider: &str, outcome: &str, latency_sec: f64) {
    metrics::counter!(
        "provider_invocations_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "provider_invocation_duration_seconds",
        "provider" => provider.to_string()
    )
    .record(latency_sec);
}

/// Track token usage.
pub fn track_tokens(provider: &str, prompt: u64, completion: u64) {
    metrics::counter!("llm_token_usage_total", "provider" => provider.to_string(), "type" => "prompt").increment(prompt);
    metrics::counter!("llm_token_usage_total", "provider" => provider.to_string(), "type" => "completion").increment(completion);
}

/// Track a command reaching a lifecycle state.
pub fn track_command(intent: &str, state: &str) {
    metrics::counter!(
        "commands_total",
        "intent" => intent.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}
