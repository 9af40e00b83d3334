//! Mock implementations of core traits for testing.
//!
//! These mocks are shared by the unit and integration tests of every crate
//! in the workspace, and back the `mock` provider kind for dry runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::{
    traits::{compose_prompt, LlmProvider, Retriever},
    types::{Passage, ProviderReply, Usage},
    Error, Result,
};

// =============================================================================
// Mock Provider
// =============================================================================

/// Scripted outcome of one mock call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Reply with this text.
    Reply(String),
    /// Fail with `ProviderUnavailable`.
    Unavailable(String),
    /// Fail with `ProviderRejected`.
    Rejected(String),
}

/// Scripted mock provider.
///
/// Outcomes are consumed in order; the last one repeats once the script runs
/// out. An optional delay simulates a slow backend (use with a paused tokio
/// clock in tests).
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<MockOutcome>>,
    last: Mutex<MockOutcome>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Create a mock that always replies with `response`.
    pub fn replying(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self::scripted(name, vec![MockOutcome::Reply(response.into())])
    }

    /// Create a mock that is always unavailable.
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self::scripted(name, vec![MockOutcome::Unavailable("connection refused".into())])
    }

    /// Create a mock that always rejects.
    pub fn rejecting(name: impl Into<String>) -> Self {
        Self::scripted(name, vec![MockOutcome::Rejected("content policy".into())])
    }

    /// Create a mock with a queue of outcomes.
    pub fn scripted(name: impl Into<String>, outcomes: Vec<MockOutcome>) -> Self {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or_else(|| MockOutcome::Reply("ok".into()));
        Self {
            name: name.into(),
            script: Mutex::new(outcomes.into()),
            last: Mutex::new(last),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of calls made to this mock.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> MockOutcome {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        match script.pop_front() {
            Some(outcome) => {
                *self.last.lock().unwrap_or_else(|e| e.into_inner()) = outcome.clone();
                outcome
            }
            None => self.last.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn invoke(&self, prompt: &str, context: Option<&str>) -> Result<ProviderReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let full_prompt = compose_prompt(prompt, context);
        match self.next_outcome() {
            MockOutcome::Reply(text) => {
                let prompt_tokens = full_prompt.len() as u64 / 4;
                let completion_tokens = text.len() as u64 / 4;
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
            MockOutcome::Unavailable(reason) => Err(Error::unavailable(&self.name, reason)),
            MockOutcome::Rejected(reason) => Err(Error::rejected(&self.name, reason)),
        }
    }
}

// =============================================================================
// Mock Retriever
// =============================================================================

/// Retriever returning fixed passages.
#[derive(Default)]
pub struct MockRetriever {
    passages: Vec<Passage>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockRetriever {
    /// Create a retriever that returns `texts` as passages, best first.
    pub fn with_texts(texts: &[&str]) -> Self {
        let passages = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Passage {
                id: format!("passage-{}", i),
                text: text.to_string(),
                score: 1.0 - i as f32 * 0.1,
                metadata: Default::default(),
            })
            .collect();
        Self {
            passages,
            ..Default::default()
        }
    }

    /// Create a retriever that always fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Queries received so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).push(query.to_string());
        if self.fail {
            return Err(Error::retrieval("mock retriever offline"));
        }
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}
