//! In-memory passage retriever.
//!
//! Ranks passages by keyword overlap with the query. It backs `rag_query`
//! commands when no external retrieval service is wired in.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;

use citydesk_core::{traits::Retriever, types::Passage, Error, Result};

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Keyword-overlap retriever over a fixed corpus.
#[derive(Debug, Default)]
pub struct InMemoryRetriever {
    passages: RwLock<Vec<Passage>>,
}

impl InMemoryRetriever {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages: RwLock::new(passages),
        }
    }

    /// Load a JSON array of passages.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::retrieval(format!("Failed to read corpus {}: {}", path.display(), e)))?;
        let passages: Vec<Passage> = serde_json::from_str(&content)?;
        tracing::info!(path = %path.display(), passages = passages.len(), "Corpus loaded");
        Ok(Self::new(passages))
    }

    pub async fn add(&self, passage: Passage) {
        self.passages.write().await.push(passage);
    }

    pub async fn len(&self) -> usize {
        self.passages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.passages.read().await.is_empty()
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let query_terms = keywords(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let passages = self.passages.read().await;
        let mut scored: Vec<(f32, &Passage)> = passages
            .iter()
            .map(|p| {
                let overlap = keywords(&p.text).intersection(&query_terms).count();
                (overlap as f32 / query_terms.len() as f32, p)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // Stable sort keeps corpus order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, p)| Passage {
                score,
                ..p.clone()
            })
            .collect())
    }
}
