//! Rig LLM client adapter.
//!
//! Wraps Rig's agents behind the `LlmProvider` trait.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use citydesk_core::{
    traits::{compose_prompt, LlmProvider},
    types::{ProviderKind, ProviderReply, Usage},
    Error, Result,
};

use rig::client::{CompletionClient, ProviderClient as _};
use rig::completion::{CompletionError, Prompt, PromptError};

const DEFAULT_PREAMBLE: &str =
    "You are a municipal information assistant. Answer precisely and cite the provided context when it is relevant.";

/// Backend family served through Rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigProvider {
    OpenAI,
    Anthropic,
    Gemini,
}

impl RigProvider {
    /// Map a configured kind onto a Rig backend.
    pub fn from_kind(kind: ProviderKind) -> Option<Self> {
        match kind {
            ProviderKind::OpenAi => Some(Self::OpenAI),
            ProviderKind::Anthropic => Some(Self::Anthropic),
            ProviderKind::Gemini => Some(Self::Gemini),
            ProviderKind::Mock => None,
        }
    }
}

/// Configuration for Rig client.
#[derive(Debug, Clone)]
pub struct RigConfig {
    /// Provider to use.
    pub provider: RigProvider,
    /// Model name.
    pub model: String,
    /// System prompt.
    pub system_prompt: Option<String>,
}

impl RigConfig {
    pub fn new(provider: RigProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: Some(DEFAULT_PREAMBLE.to_string()),
        }
    }

    /// Set system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Rig-based provider client. `id` is the provider id used in errors.
#[derive(Debug)]
pub struct RigLlmClient {
    id: String,
    config: RigConfig,
    api_key: SecretString,
}

impl RigLlmClient {
    pub fn new(id: impl Into<String>, config: RigConfig, api_key: SecretString) -> Self {
        Self {
            id: id.into(),
            config,
            api_key,
        }
    }

    /// Sort a Rig failure into rejection (the backend answered and refused)
    /// or unavailability (everything else).
    fn classify(&self, err: PromptError) -> Error {
        match err {
            PromptError::CompletionError(CompletionError::ProviderError(msg)) => {
                Error::rejected(&self.id, msg)
            }
            other => Error::unavailable(&self.id, other.to_string()),
        }
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        use rig::providers::{anthropic, gemini, openai};

        let key = self.api_key.expose_secret().as_str();
        if key.trim().is_empty() {
            return Err(Error::unavailable(&self.id, "API key is empty"));
        }

        let preamble = self.config.system_prompt.as_deref().unwrap_or(DEFAULT_PREAMBLE);
        let model = self.config.model.as_str();

        let response = match self.config.provider {
            RigProvider::OpenAI => {
                let agent = openai::Client::from_val(key.to_string().into()).agent(model).preamble(preamble).build();
                agent.prompt(prompt).await
            }
            RigProvider::Anthropic => {
                let agent = anthropic::Client::from_val(key.to_string().into()).agent(model).preamble(preamble).build();
                agent.prompt(prompt).await
            }
            RigProvider::Gemini => {
                let agent = gemini::Client::from_val(key.to_string().into()).agent(model).preamble(preamble).build();
                agent.prompt(prompt).await
            }
        };

        response.map_err(|e| self.classify(e))
    }
}

#[async_trait]
impl LlmProvider for RigLlmClient {
    async fn invoke(&self, prompt: &str, context: Option<&str>) -> Result<ProviderReply> {
        let full_prompt = compose_prompt(prompt, context);
        tracing::debug!(
            provider = %self.id,
            backend = ?self.config.provider,
            model = %self.config.model,
            prompt_len = full_prompt.len(),
            "Calling LLM"
        );

        let text = self.call(&full_prompt).await?;

        // Rig's prompt API does not surface usage; estimate at ~4 chars per token.
        let prompt_tokens = (full_prompt.len() / 4) as u64;
        let completion_tokens = (text.len() / 4) as u64;
        Ok(ProviderReply {
            text,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                cost_usd: 0.0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = RigConfig::new(RigProvider::Anthropic, "claude-3-5-haiku-latest")
            .with_system_prompt("Answer in one sentence");

        assert_eq!(config.provider, RigProvider::Anthropic);
        assert_eq!(config.system_prompt.as_deref(), Some("Answer in one sentence"));
    }

    #[test]
    fn test_mock_kind_has_no_rig_backend() {
        assert_eq!(RigProvider::from_kind(ProviderKind::Gemini), Some(RigProvider::Gemini));
        assert_eq!(RigProvider::from_kind(ProviderKind::Mock), None);
    }

    #[tokio::test]
    async fn test_empty_key_is_unavailable() {
        let client = RigLlmClient::new(
            "gemini",
            RigConfig::new(RigProvider::Gemini, "gemini-2.0-flash"),
            SecretString::new(String::new()),
        );
        let err = client.invoke("hello", None).await.unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable { .. }));
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = RigLlmClient::new(
            "openai",
            RigConfig::new(RigProvider::OpenAI, "gpt-4o-mini"),
            SecretString::new("sk-live-123".to_string()),
        );
        assert!(!format!("{:?}", client).contains("sk-live-123"));
    }
}
