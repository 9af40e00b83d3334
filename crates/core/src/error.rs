//! Error types for CityDesk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using CityDesk's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// One provider's failure inside a strategy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider that failed.
    pub provider: String,
    /// Stable error code (see [`Error::code`]).
    pub code: String,
    /// Human readable message.
    pub message: String,
}

impl ProviderFailure {
    /// Capture a provider failure from an error.
    pub fn from_error(provider: impl Into<String>, error: &Error) -> Self {
        Self {
            provider: provider.into(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Core error type for CityDesk.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Router Errors
    // =========================================================================
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Admission Errors
    // =========================================================================
    #[error("Rate limited: {provider}/{endpoint}")]
    RateLimited { provider: String, endpoint: String },

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Provider {provider} rejected request: {reason}")]
    ProviderRejected { provider: String, reason: String },

    #[error("All providers exhausted after {} attempt(s)", failures.len())]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid intent error.
    pub fn invalid_intent(msg: impl Into<String>) -> Self {
        Self::InvalidIntent(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a rate limited error.
    pub fn rate_limited(provider: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Create a provider unavailable error.
    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create a provider rejected error.
    pub fn rejected(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderRejected {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create a retrieval error.
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::RetrievalFailed(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIntent(_) => "INVALID_INTENT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Self::ProviderRejected { .. } => "PROVIDER_REJECTED",
            Self::AllProvidersExhausted { .. } => "ALL_PROVIDERS_EXHAUSTED",
            Self::RetrievalFailed(_) => "RETRIEVAL_FAILED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Per-provider failures carried by an aggregate error.
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersExhausted { failures } => failures,
            _ => &[],
        }
    }
}
