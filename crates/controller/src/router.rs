//! Command router: public entry point of the orchestration layer.
//!
//! `submit` validates and records a command, hands it to the worker pool and
//! returns its id at once. Workers drive the command through the ledger while
//! callers poll `get` or await `wait_for`.

use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use citydesk_core::{
    config::RouterConfig,
    traits::{RecordFilter, Retriever},
    types::{
        BucketStats, Command, CommandError, CommandStats, CrossValidation, FallbackOutcome,
        Intent, InvocationResult, Passage, ProviderDescriptor,
    },
    Error, Result,
};
use citydesk_model_gateway::{InvocationStrategies, ProviderInfo, UsageReport};

use crate::ledger::CommandLedger;
use crate::planner::{self, Plan, Route};
use crate::scheduler::WorkerPool;

pub(crate) struct RouterInner {
    pub(crate) ledger: CommandLedger,
    pub(crate) strategies: Arc<InvocationStrategies>,
    pub(crate) retriever: Option<Arc<dyn Retriever>>,
    pub(crate) pool: WorkerPool,
    pub(crate) config: RouterConfig,
}

/// Cheap to clone; clones share one ledger and one worker pool.
#[derive(Clone)]
pub struct CommandRouter {
    inner: Arc<RouterInner>,
}

impl CommandRouter {
    pub(crate) fn from_inner(inner: RouterInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Accept a command and schedule it. Returns once it is recorded Pending.
    pub async fn submit(&self, intent: Intent, parameters: Value, submitter: &str) -> Result<String> {
        planner::plan(intent, &parameters)?;

        let command = self
            .inner
            .ledger
            .create(Command::new(intent, parameters, submitter))
            .await?;
        let id = command.id;

        tracing::info!(command_id = %id, intent = %intent, submitter = submitter, "Command accepted");

        let router = self.clone();
        let task_id = id.clone();
        self.inner.pool.spawn(async move {
            router.execute(&task_id).await;
        });

        Ok(id)
    }

    /// [`submit`](Self::submit) with the intent given by name.
    pub async fn submit_named(&self, intent: &str, parameters: Value, submitter: &str) -> Result<String> {
        let intent = Intent::from_str(intent)?;
        self.submit(intent, parameters, submitter).await
    }

    /// Current snapshot of a command.
    pub async fn get(&self, id: &str) -> Result<Command> {
        self.inner.ledger.get(id).await
    }

    /// Wait until a command is terminal or `timeout` passes, then return its
    /// snapshot (which may still be non-terminal after a timeout).
    pub async fn wait_for(&self, id: &str, timeout: Duration) -> Result<Command> {
        // Subscribe before reading so no transition slips between the two.
        let mut updates = self.inner.ledger.subscribe();
        let current = self.get(id).await?;
        if current.state.is_terminal() {
            return Ok(current);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, updates.recv()).await {
                Ok(Ok(update)) if update.id == id && update.state.is_terminal() => break,
                Ok(Ok(_)) => continue,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!(command_id = id, skipped = skipped, "Update stream lagged");
                    if self.get(id).await?.state.is_terminal() {
                        break;
                    }
                }
                Ok(Err(RecvError::Closed)) | Err(_) => break,
            }
        }

        self.get(id).await
    }

    /// Persisted command records.
    pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<Command>> {
        self.inner.ledger.records(filter).await
    }

    /// Command KPIs, limited to commands created within `window` when given.
    pub async fn stats(&self, window: Option<Duration>) -> Result<CommandStats> {
        let since = window
            .map(|window| {
                chrono::Duration::from_std(window)
                    .ok()
                    .and_then(|window| chrono::Utc::now().checked_sub_signed(window))
                    .ok_or_else(|| Error::invalid_request("stats window is too large"))
            })
            .transpose()?;
        self.inner.ledger.stats(since).await
    }

    /// Run a recorded command. Attempts on a command that is no longer
    /// Pending do nothing.
    pub async fn execute(&self, id: &str) {
        let ledger = &self.inner.ledger;
        match ledger.mark_running(id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::error!(command_id = id, error = %e, "Cannot start command");
                return;
            }
        }

        let outcome = match ledger.get(id).await {
            Ok(command) => self.run(&command).await,
            Err(e) => Err(e),
        };

        let outcome = outcome.map_err(|e| {
            tracing::warn!(command_id = id, code = e.code(), error = %e, "Command failed");
            CommandError::from(&e)
        });

        if let Err(e) = ledger.finish(id, outcome).await {
            tracing::error!(command_id = id, error = %e, "Cannot complete command");
        }
    }

    async fn run(&self, command: &Command) -> Result<Value> {
        let strategies = &self.inner.strategies;

        match planner::plan(command.intent, &command.parameters)? {
            Plan::Llm {
                prompt,
                context,
                route: Route::Provider(provider),
            } => {
                let result = strategies.single(&provider, &prompt, context.as_deref()).await?;
                Ok(serde_json::to_value(result)?)
            }
            Plan::Llm {
                prompt,
                context,
                route: Route::Preferred(provider),
            } => {
                let outcome = strategies
                    .fallback_from(&provider, &prompt, context.as_deref())
                    .await?;
                Ok(serde_json::to_value(outcome)?)
            }
            Plan::Llm {
                prompt,
                context,
                route: Route::Fallback(providers),
            } => {
                let outcome = strategies
                    .fallback(&providers, &prompt, context.as_deref())
                    .await?;
                Ok(serde_json::to_value(outcome)?)
            }
            Plan::Rag { query, k, providers } => {
                let passages = self.retrieve(&query, k.unwrap_or(self.inner.config.retrieval_k)).await?;
                let context = (!passages.is_empty()).then(|| format_context(&passages));
                let outcome = strategies
                    .fallback(&providers, &query, context.as_deref())
                    .await?;
                Ok(json!({
                    "passages": passages,
                    "answer": outcome,
                }))
            }
            Plan::CrossValidate {
                prompt,
                context,
                providers,
            } => {
                let report = strategies
                    .cross_validate(&providers, &prompt, context.as_deref())
                    .await?;
                Ok(serde_json::to_value(report)?)
            }
        }
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let retriever = self
            .inner
            .retriever
            .as_ref()
            .ok_or_else(|| Error::retrieval("no retriever configured"))?;

        let timeout = self.inner.config.retrieval_timeout();
        match tokio::time::timeout(timeout, retriever.retrieve(query, k)).await {
            Ok(Ok(passages)) => Ok(passages),
            Ok(Err(Error::RetrievalFailed(msg))) => Err(Error::retrieval(msg)),
            Ok(Err(other)) => Err(Error::retrieval(other.to_string())),
            Err(_) => Err(Error::retrieval(format!(
                "timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    // =========================================================================
    // Direct invocation
    // =========================================================================

    pub async fn invoke_provider(
        &self,
        provider: &str,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<InvocationResult> {
        self.inner.strategies.single(provider, prompt, context).await
    }

    pub async fn invoke_with_fallback(
        &self,
        providers: &[String],
        prompt: &str,
        context: Option<&str>,
    ) -> Result<FallbackOutcome> {
        self.inner.strategies.fallback(providers, prompt, context).await
    }

    pub async fn cross_validate(
        &self,
        providers: &[String],
        prompt: &str,
        context: Option<&str>,
    ) -> Result<CrossValidation> {
        self.inner
            .strategies
            .cross_validate(providers, prompt, context)
            .await
    }

    // =========================================================================
    // Quotas and providers
    // =========================================================================

    pub fn rate_limit_stats(&self, provider: Option<&str>) -> Vec<BucketStats> {
        self.inner.strategies.admission().stats(provider)
    }

    pub fn override_rate_limit(&self, provider: &str, capacity_delta: u64, ttl: Duration) -> Result<()> {
        self.inner
            .strategies
            .admission()
            .override_capacity(provider, capacity_delta, ttl)
    }

    pub fn usage_stats(&self) -> UsageReport {
        self.inner.strategies.gateway().usage_stats()
    }

    pub fn provider_info(&self, provider: &str) -> Result<ProviderInfo> {
        self.inner.strategies.gateway().provider_info(provider)
    }

    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        self.inner.strategies.gateway().descriptors()
    }
}

fn format_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| format!("[{}] {}", p.id, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
