//! Retrieval collaborator traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Passage;

/// Ranked passage lookup used to ground prompts.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `k` passages for `query`, best first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>>;
}
