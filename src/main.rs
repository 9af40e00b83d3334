#![deny(unused)]
//! CityDesk - resilient multi-provider command orchestration
//!
//! Accepts municipal-assistant commands over HTTP, admits them against
//! per-provider token buckets, and routes them across LLM providers with
//! fallback and cross-validation.

use std::sync::Arc;

use citydesk_controller::CommandRouterBuilder;
use citydesk_core::{
    config::AppConfig,
    traits::{RecordStore, Retriever},
};
use citydesk_gateway::{GatewayConfig, GatewayServer};
use citydesk_governance::AdmissionController;
use citydesk_model_gateway::{build_gateway, InvocationStrategies};
use citydesk_store::{InMemoryRecordStore, InMemoryRetriever, SqliteRecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    citydesk_governance::configure_tracing(&config.logging)?;
    tracing::info!("Starting CityDesk v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = citydesk_governance::setup_metrics_recorder()?;

    // =========================================================================
    // Storage
    // =========================================================================
    let store: Arc<dyn RecordStore> = match &config.store.sqlite_path {
        Some(path) => {
            tracing::info!(path = %path, "Using SQLite command records");
            Arc::new(SqliteRecordStore::new(path)?)
        }
        None => {
            tracing::info!("Using in-memory command records");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    let retriever: Arc<dyn Retriever> = match &config.store.corpus_path {
        Some(path) => Arc::new(InMemoryRetriever::from_json_file(path).await?),
        None => {
            tracing::warn!("No retrieval corpus configured; rag_query answers without context");
            Arc::new(InMemoryRetriever::new(Vec::new()))
        }
    };

    // =========================================================================
    // Providers and admission
    // =========================================================================
    let gateway = Arc::new(build_gateway(&config));
    let admission = Arc::new(AdmissionController::from_config(&config.rate_limits));
    let strategies = Arc::new(
        InvocationStrategies::new(gateway.clone(), admission)
            .with_max_parallelism(config.invocation.max_parallelism),
    );

    // =========================================================================
    // Router and HTTP
    // =========================================================================
    let router = CommandRouterBuilder::new()
        .with_config(config.router.clone())
        .with_strategies(strategies)
        .with_store(store)
        .with_retriever(retriever)
        .build()?;

    tracing::info!(
        providers = ?gateway.provider_ids(),
        worker_limit = config.router.worker_limit,
        "Command router initialized"
    );

    GatewayServer::new(GatewayConfig::from(&config.server), router)
        .with_metrics(metrics_handle)
        .run()
        .await?;

    Ok(())
}
