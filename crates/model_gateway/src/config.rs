//! Gateway construction from application configuration.

use std::sync::Arc;

use citydesk_core::{
    config::{AppConfig, ProviderSettings},
    mocks::MockProvider,
    traits::LlmProvider,
    types::ProviderKind,
};

use crate::providers::ProviderGateway;
use crate::rig_client::{RigConfig, RigLlmClient, RigProvider};

/// Build the client for one configured provider.
///
/// Returns `None` for backends whose API key is missing.
pub fn client_for(settings: &ProviderSettings) -> Option<Arc<dyn LlmProvider>> {
    match RigProvider::from_kind(settings.kind) {
        Some(backend) => {
            let Some(api_key) = settings.api_key.clone() else {
                tracing::warn!(
                    provider = %settings.id,
                    kind = %settings.kind,
                    "API key not set, provider skipped"
                );
                return None;
            };
            Some(Arc::new(RigLlmClient::new(
                settings.id.clone(),
                RigConfig::new(backend, settings.model.clone()),
                api_key,
            )))
        }
        None => {
            debug_assert_eq!(settings.kind, ProviderKind::Mock);
            Some(Arc::new(MockProvider::replying(
                settings.id.clone(),
                format!("[{}] mock answer", settings.id),
            )))
        }
    }
}

/// Register every enabled provider that has what it needs to run.
pub fn build_gateway(config: &AppConfig) -> ProviderGateway {
    let gateway = ProviderGateway::new(config.invocation.provider_timeout());
    for (index, settings) in config.providers.iter().enumerate() {
        if !settings.enabled {
            continue;
        }
        if let Some(client) = client_for(settings) {
            gateway.register(settings.descriptor(index), client);
        }
    }
    if gateway.is_empty() {
        tracing::warn!("No providers available; invocations will fail");
    }
    gateway
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn settings(id: &str, kind: ProviderKind, priority: u32) -> ProviderSettings {
        ProviderSettings {
            id: id.into(),
            kind,
            model: "m".into(),
            priority,
            capabilities: vec![],
            enabled: true,
            api_key: None,
        }
    }

    #[test]
    fn test_providers_without_keys_are_skipped() {
        let mut config = AppConfig::default();
        config.providers = vec![
            settings("openai", ProviderKind::OpenAi, 10),
            settings("local", ProviderKind::Mock, 50),
        ];

        let gateway = build_gateway(&config);
        assert_eq!(gateway.provider_ids(), vec!["local"]);
    }

    #[test]
    fn test_keyed_and_disabled_providers() {
        let mut config = AppConfig::default();
        let mut keyed = settings("anthropic", ProviderKind::Anthropic, 5);
        keyed.api_key = Some(SecretString::new("sk-test".into()));
        let mut disabled = settings("off", ProviderKind::Mock, 1);
        disabled.enabled = false;
        config.providers = vec![disabled, keyed, settings("local", ProviderKind::Mock, 50)];

        let gateway = build_gateway(&config);
        assert_eq!(gateway.provider_ids(), vec!["anthropic", "local"]);
        assert_eq!(gateway.descriptor("anthropic").unwrap().declared_index, 1);
    }
}
