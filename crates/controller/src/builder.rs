//! Builder for CommandRouter.

use std::sync::Arc;

use citydesk_core::{
    config::RouterConfig,
    traits::{RecordStore, Retriever},
    Error, Result,
};
use citydesk_model_gateway::InvocationStrategies;
use citydesk_store::InMemoryRecordStore;

use crate::ledger::CommandLedger;
use crate::router::{CommandRouter, RouterInner};
use crate::scheduler::WorkerPool;

/// Builder for constructing a CommandRouter.
pub struct CommandRouterBuilder {
    config: RouterConfig,
    strategies: Option<Arc<InvocationStrategies>>,
    store: Option<Arc<dyn RecordStore>>,
    retriever: Option<Arc<dyn Retriever>>,
}

impl CommandRouterBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            strategies: None,
            store: None,
            retriever: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the invocation strategies (required).
    pub fn with_strategies(mut self, strategies: Arc<InvocationStrategies>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Set the record store. Defaults to an in-memory store.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the retriever used by `rag_query` commands.
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Build the router.
    pub fn build(self) -> Result<CommandRouter> {
        let strategies = self
            .strategies
            .ok_or_else(|| Error::config("CommandRouter requires invocation strategies"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryRecordStore::new()));

        if self.retriever.is_none() {
            tracing::warn!("No retriever configured; rag_query commands will fail");
        }

        let pool = WorkerPool::new(self.config.worker_limit);
        tracing::debug!(worker_limit = pool.limit(), "Command worker pool ready");

        Ok(CommandRouter::from_inner(RouterInner {
            ledger: CommandLedger::new(store),
            strategies,
            retriever: self.retriever,
            pool,
            config: self.config,
        }))
    }
}

impl Default for CommandRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
