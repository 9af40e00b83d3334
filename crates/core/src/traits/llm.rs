//! Provider backend traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ProviderReply;

/// Uniform invoke capability of an external inference backend.
///
/// Implementations map transport, auth and timeout problems to
/// `Error::ProviderUnavailable` and semantic refusals (content policy and the
/// like) to `Error::ProviderRejected`. They never retry.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate text for `prompt`, optionally grounded in `context`.
    async fn invoke(&self, prompt: &str, context: Option<&str>) -> Result<ProviderReply>;
}

/// Prompt layout shared by all backends.
pub fn compose_prompt(prompt: &str, context: Option<&str>) -> String {
    match context.filter(|c| !c.trim().is_empty()) {
        Some(context) => format!("Context: {}\n\nQuery: {}", context, prompt),
        None => prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_prompt() {
        assert_eq!(compose_prompt("hi", None), "hi");
        assert_eq!(compose_prompt("hi", Some("  ")), "hi");
        assert_eq!(compose_prompt("hi", Some("ctx")), "Context: ctx\n\nQuery: hi");
    }
}
