use serde::{Deserialize, Serialize};

// =============================================================================
// Provider Types
// =============================================================================

/// Backend family of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    /// Scripted in-process provider, for tests and dry runs.
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Mock => "mock",
        }
    }

    /// Environment variable holding the API key, if the backend needs one.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Mock => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability flags advertised by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    TextGeneration,
    Chat,
    Reasoning,
    Multimodal,
}

/// Static description of a configured provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Provider identifier (e.g. "openai").
    pub id: String,
    /// Backend family.
    pub kind: ProviderKind,
    /// Model name passed to the backend.
    pub model: String,
    /// Fallback priority, lower values are tried first.
    pub priority: u32,
    /// Advertised capabilities.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Position in the configuration, breaks priority ties.
    #[serde(default)]
    pub declared_index: usize,
}

impl ProviderDescriptor {
    /// Create a descriptor with text generation capability.
    pub fn new(id: impl Into<String>, kind: ProviderKind, model: impl Into<String>, priority: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            model: model.into(),
            priority,
            capabilities: vec![Capability::TextGeneration],
            declared_index: 0,
        }
    }

    /// Key used for fallback ordering.
    pub fn order_key(&self) -> (u32, usize) {
        (self.priority, self.declared_index)
    }
}

/// Accumulated usage counters of a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub provider: String,
    pub calls: u64,
    pub failures: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub last_latency_ms: Option<u64>,
}
