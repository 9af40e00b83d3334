use config::{Config, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use crate::types::{Capability, ProviderDescriptor, ProviderKind, QuotaLimit};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub router: RouterConfig,
    pub invocation: InvocationConfig,
    pub rate_limits: RateLimitConfig,
    pub providers: Vec<ProviderSettings>,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            allowed_origins: vec!["*".into()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum commands executing at once.
    pub worker_limit: usize,
    /// Passages requested per retrieval.
    pub retrieval_k: usize,
    pub retrieval_timeout_ms: u64,
}

impl RouterConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            worker_limit: 32,
            retrieval_k: 5,
            retrieval_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InvocationConfig {
    /// Per-call provider timeout.
    pub provider_timeout_ms: u64,
    /// Concurrent calls during cross-validation.
    pub max_parallelism: usize,
}

impl InvocationConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 30_000,
            max_parallelism: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Limit for buckets that are not declared explicitly.
    pub default_limit: Option<QuotaLimit>,
    #[serde(default)]
    pub buckets: Vec<BucketConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: Some(QuotaLimit::per_minute(100)),
            buckets: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BucketConfig {
    pub provider: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub limit: QuotaLimit,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderSettings {
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Read from the backend's environment variable, never from files.
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

fn default_priority() -> u32 {
    100
}

fn default_enabled() -> bool {
    true
}

impl ProviderSettings {
    /// Descriptor for this entry at position `index` of the configuration.
    pub fn descriptor(&self, index: usize) -> ProviderDescriptor {
        ProviderDescriptor {
            id: self.id.clone(),
            kind: self.kind,
            model: self.model.clone(),
            priority: self.priority,
            capabilities: if self.capabilities.is_empty() {
                vec![Capability::TextGeneration]
            } else {
                self.capabilities.clone()
            },
            declared_index: index,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file for command records; in-memory when unset.
    pub sqlite_path: Option<String>,
    /// JSON file of passages loaded into the in-memory retriever.
    pub corpus_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    pub filter: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,citydesk=debug".into(),
            json: false,
            otlp_endpoint: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("CITYDESK_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map CITYDESK__SERVER__PORT=3000 to server.port
            .add_source(Environment::with_prefix("CITYDESK").separator("__"))
            .build()?;

        let mut cfg: Self = s.try_deserialize()?;

        cfg.fill_api_keys_from_env();
        Ok(cfg)
    }

    /// Take provider keys from the conventional environment variables.
    fn fill_api_keys_from_env(&mut self) {
        for provider in &mut self.providers {
            if provider.api_key.is_some() {
                continue;
            }
            let Some(var) = provider.kind.api_key_var() else {
                continue;
            };
            if let Ok(key) = std::env::var(var) {
                provider.api_key = Some(SecretString::new(key));
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            router: RouterConfig::default(),
            invocation: InvocationConfig::default(),
            rate_limits: RateLimitConfig {
                default_limit: Some(QuotaLimit::per_minute(100)),
                buckets: vec![
                    BucketConfig {
                        provider: "openai".into(),
                        endpoint: "completion".into(),
                        limit: QuotaLimit::per_minute(50),
                    },
                    BucketConfig {
                        provider: "gemini".into(),
                        endpoint: "completion".into(),
                        limit: QuotaLimit::per_minute(50),
                    },
                ],
            },
            providers: vec![
                ProviderSettings {
                    id: "openai".into(),
                    kind: ProviderKind::OpenAi,
                    model: "gpt-4o-mini".into(),
                    priority: 10,
                    capabilities: vec![Capability::TextGeneration, Capability::Chat, Capability::Reasoning],
                    enabled: true,
                    api_key: None,
                },
                ProviderSettings {
                    id: "gemini".into(),
                    kind: ProviderKind::Gemini,
                    model: "gemini-2.0-flash".into(),
                    priority: 20,
                    capabilities: vec![Capability::TextGeneration, Capability::Reasoning, Capability::Multimodal],
                    enabled: true,
                    api_key: None,
                },
            ],
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
