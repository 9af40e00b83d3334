use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use citydesk_controller::{CommandRouter, CommandRouterBuilder};
use citydesk_core::{
    config::RouterConfig,
    mocks::{MockProvider, MockRetriever},
    traits::{RecordFilter, RecordStore, Retriever},
    Command, CommandState, Error, Intent, Passage, ProviderDescriptor, ProviderKind, QuotaLimit, Result,
};
use citydesk_governance::AdmissionController;
use citydesk_model_gateway::{InvocationStrategies, ProviderGateway, COMPLETION_ENDPOINT};
use citydesk_store::InMemoryRecordStore;

const WAIT: Duration = Duration::from_secs(30);

struct Fixture {
    router: CommandRouter,
    store: Arc<InMemoryRecordStore>,
    admission: Arc<AdmissionController>,
}

fn fixture(
    providers: Vec<(&str, MockProvider)>,
    retriever: Option<Arc<dyn Retriever>>,
    config: RouterConfig,
) -> Fixture {
    let gateway = Arc::new(ProviderGateway::new(Duration::from_secs(60)));
    let admission = Arc::new(AdmissionController::new(None));
    for (index, (id, mock)) in providers.into_iter().enumerate() {
        let mut descriptor = ProviderDescriptor::new(id, ProviderKind::Mock, "echo", 10);
        descriptor.declared_index = index;
        gateway.register(descriptor, Arc::new(mock));
        admission.set_limit(id, COMPLETION_ENDPOINT, QuotaLimit::per_minute(100));
    }

    let store = Arc::new(InMemoryRecordStore::new());
    let strategies = Arc::new(InvocationStrategies::new(gateway, admission.clone()));
    let mut builder = CommandRouterBuilder::new()
        .with_config(config)
        .with_strategies(strategies)
        .with_store(store.clone());
    if let Some(retriever) = retriever {
        builder = builder.with_retriever(retriever);
    }

    Fixture {
        router: builder.build().unwrap(),
        store,
        admission,
    }
}

fn simple(providers: Vec<(&str, MockProvider)>) -> Fixture {
    fixture(providers, None, RouterConfig::default())
}

#[tokio::test]
async fn test_llm_query_succeeds() -> anyhow::Result<()> {
    let f = simple(vec![("a", MockProvider::replying("a", "Trash pickup is on Monday."))]);

    let id = f
        .router
        .submit(Intent::LlmQuery, json!({"prompt": "When is trash pickup?"}), "resident")
        .await?;
    assert!(id.starts_with("cmd_"));

    let done = f.router.wait_for(&id, WAIT).await?;
    assert_eq!(done.state, CommandState::Succeeded);
    let result = done.result.unwrap();
    assert_eq!(result["result"]["provider"], "a");
    assert_eq!(result["result"]["output"], "Trash pickup is on Monday.");
    assert_eq!(result["fallback_used"], false);
    Ok(())
}

#[tokio::test]
async fn test_invalid_intent_creates_no_state() {
    let f = simple(vec![("a", MockProvider::replying("a", "ok"))]);

    let err = f
        .router
        .submit_named("weather_report", json!({}), "resident")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidIntent(_)));

    let err = f
        .router
        .submit(Intent::CrossValidate, json!({"context": "no prompt"}), "resident")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INTENT");

    assert_eq!(f.router.stats(None).await.unwrap().total, 0);
    assert!(f.store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_pending_is_observable_while_workers_are_busy() {
    let config = RouterConfig {
        worker_limit: 1,
        ..Default::default()
    };
    let f = fixture(
        vec![("slow", MockProvider::replying("slow", "done").with_delay(Duration::from_secs(5)))],
        None,
        config,
    );

    let first = f
        .router
        .submit(Intent::LlmQuery, json!({"prompt": "one"}), "clerk")
        .await
        .unwrap();
    let second = f
        .router
        .submit(Intent::LlmQuery, json!({"prompt": "two"}), "clerk")
        .await
        .unwrap();

    // Right after submission nothing can be terminal.
    assert!(!f.router.get(&first).await.unwrap().state.is_terminal());

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let mut states = vec![
        f.router.get(&first).await.unwrap().state,
        f.router.get(&second).await.unwrap().state,
    ];
    states.sort_by_key(|s| s.as_str());
    assert_eq!(states, vec![CommandState::Pending, CommandState::Running]);

    let a = f.router.wait_for(&first, WAIT).await.unwrap();
    let b = f.router.wait_for(&second, WAIT).await.unwrap();
    assert_eq!(a.state, CommandState::Succeeded);
    assert_eq!(b.state, CommandState::Succeeded);
}

#[tokio::test]
async fn test_exhausted_fallback_records_failures() {
    let f = simple(vec![
        ("a", MockProvider::unavailable("a")),
        ("b", MockProvider::rejecting("b")),
    ]);

    let id = f
        .router
        .submit(Intent::LlmQuery, json!({"prompt": "q", "providers": ["a", "b"]}), "clerk")
        .await
        .unwrap();
    let done = f.router.wait_for(&id, WAIT).await.unwrap();

    assert_eq!(done.state, CommandState::Failed);
    assert!(done.result.is_none());
    let error = done.error.unwrap();
    assert_eq!(error.code, "ALL_PROVIDERS_EXHAUSTED");
    assert!(!error.message.is_empty());
    let failed: Vec<&str> = error.failures.iter().map(|p| p.provider.as_str()).collect();
    assert_eq!(failed, vec!["a", "b"]);
}

#[tokio::test]
async fn test_submission_succeeds_when_rate_limited() {
    let f = simple(vec![("a", MockProvider::replying("a", "ok"))]);
    f.admission
        .set_limit("a", COMPLETION_ENDPOINT, QuotaLimit::per_minute(0));

    let id = f
        .router
        .submit(Intent::LlmQuery, json!({"prompt": "q", "provider": "a"}), "clerk")
        .await
        .unwrap();
    let done = f.router.wait_for(&id, WAIT).await.unwrap();
    assert_eq!(done.state, CommandState::Failed);
    assert_eq!(done.error.unwrap().code, "RATE_LIMITED");
}

#[tokio::test]
async fn test_rag_query_uses_retrieved_context() {
    let retriever = Arc::new(MockRetriever::with_texts(&[
        "Street sweeping runs Tuesdays.",
        "Move your car by 8am.",
    ]));
    let f = fixture(
        vec![("a", MockProvider::replying("a", "Tuesdays, move by 8am."))],
        Some(retriever.clone()),
        RouterConfig::default(),
    );

    let id = f
        .router
        .submit(Intent::RagQuery, json!({"query": "street sweeping", "k": 1}), "resident")
        .await
        .unwrap();
    let done = f.router.wait_for(&id, WAIT).await.unwrap();

    assert_eq!(done.state, CommandState::Succeeded);
    let result = done.result.unwrap();
    assert_eq!(result["passages"].as_array().unwrap().len(), 1);
    assert_eq!(result["answer"]["result"]["output"], "Tuesdays, move by 8am.");
    assert_eq!(retriever.queries(), vec!["street sweeping".to_string()]);
}

#[tokio::test]
async fn test_rag_query_retrieval_failure() {
    let f = fixture(
        vec![("a", MockProvider::replying("a", "unused"))],
        Some(Arc::new(MockRetriever::failing())),
        RouterConfig::default(),
    );

    let id = f
        .router
        .submit(Intent::RagQuery, json!({"query": "zoning"}), "resident")
        .await
        .unwrap();
    let done = f.router.wait_for(&id, WAIT).await.unwrap();
    assert_eq!(done.state, CommandState::Failed);
    assert_eq!(done.error.unwrap().code, "RETRIEVAL_FAILED");
    assert_eq!(f.router.usage_stats().total_calls, 0);
}

struct StalledRetriever;

#[async_trait]
impl Retriever for StalledRetriever {
    async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<Passage>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn test_rag_query_retrieval_timeout() {
    let config = RouterConfig {
        retrieval_timeout_ms: 500,
        ..Default::default()
    };
    let f = fixture(
        vec![("a", MockProvider::replying("a", "unused"))],
        Some(Arc::new(StalledRetriever)),
        config,
    );

    let id = f
        .router
        .submit(Intent::RagQuery, json!({"query": "permits"}), "resident")
        .await
        .unwrap();
    let done = f.router.wait_for(&id, WAIT).await.unwrap();
    let error = done.error.unwrap();
    assert_eq!(error.code, "RETRIEVAL_FAILED");
    assert!(error.message.contains("timed out"));
}

#[tokio::test]
async fn test_cross_validate_command() {
    let f = simple(vec![
        ("a", MockProvider::replying("a", "Library closes at 8")),
        ("b", MockProvider::unavailable("b")),
        ("c", MockProvider::replying("c", "library closes at 8")),
    ]);

    let id = f
        .router
        .submit(Intent::CrossValidate, json!({"prompt": "When does the library close?"}), "clerk")
        .await
        .unwrap();
    let done = f.router.wait_for(&id, WAIT).await.unwrap();
    let result = done.result.unwrap();
    assert_eq!(result["successful"], 2);
    assert_eq!(result["failed"], 1);
    assert_eq!(result["agreement"]["unanimous"], true);
}

#[tokio::test]
async fn test_repeated_execution_is_a_noop() {
    let f = simple(vec![("a", MockProvider::replying("a", "ok"))]);
    let id = f
        .router
        .submit(Intent::LlmQuery, json!({"prompt": "q"}), "clerk")
        .await
        .unwrap();
    let first = f.router.wait_for(&id, WAIT).await.unwrap();

    f.router.execute(&id).await;

    let again = f.router.get(&id).await.unwrap();
    assert_eq!(again, first);
    let history = f
        .store
        .query_records(&RecordFilter::command(id.clone()))
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(f.router.usage_stats().total_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_times_out_with_current_snapshot() {
    let f = simple(vec![(
        "slow",
        MockProvider::replying("slow", "late").with_delay(Duration::from_secs(20)),
    )]);
    let id = f
        .router
        .submit(Intent::LlmQuery, json!({"prompt": "q"}), "clerk")
        .await
        .unwrap();

    let snapshot = f.router.wait_for(&id, Duration::from_secs(1)).await.unwrap();
    assert_eq!(snapshot.state, CommandState::Running);

    assert!(matches!(
        f.router.wait_for("cmd_unknown", WAIT).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_and_stats() {
    let f = simple(vec![("a", MockProvider::replying("a", "ok"))]);
    for submitter in ["ann", "ben", "ann"] {
        let id = f
            .router
            .submit(Intent::LlmQuery, json!({"prompt": "q"}), submitter)
            .await
            .unwrap();
        f.router.wait_for(&id, WAIT).await.unwrap();
    }

    let anns = f
        .router
        .list(&RecordFilter {
            submitter: Some("ann".into()),
            latest_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(anns.len(), 2);
    assert!(anns.iter().all(|c| c.state == CommandState::Succeeded));

    let stats = f.router.stats(None).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.success_rate, 100.0);
}

#[tokio::test]
async fn test_stats_window_skips_older_commands() {
    let f = simple(vec![("a", MockProvider::replying("a", "ok"))]);

    let mut earlier = Command::new(Intent::LlmQuery, json!({"prompt": "q"}), "ann");
    earlier.created_at = chrono::Utc::now() - chrono::Duration::hours(5);
    earlier.state = CommandState::Failed;
    f.store.append_record(&earlier).await.unwrap();

    let id = f
        .router
        .submit(Intent::LlmQuery, json!({"prompt": "q"}), "ben")
        .await
        .unwrap();
    f.router.wait_for(&id, WAIT).await.unwrap();

    let all = f.router.stats(None).await.unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(all.failed, 1);
    assert_eq!(all.success_rate, 50.0);

    let recent = f.router.stats(Some(Duration::from_secs(3600))).await.unwrap();
    assert_eq!(recent.total, 1);
    assert_eq!(recent.succeeded, 1);
    assert_eq!(recent.failed, 0);

    let err = f.router.stats(Some(Duration::MAX)).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn test_override_unknown_provider() {
    let f = simple(vec![("a", MockProvider::replying("a", "ok"))]);
    assert!(matches!(
        f.router.override_rate_limit("zzz", 10, Duration::from_secs(60)),
        Err(Error::NotFound(_))
    ));
    f.router
        .override_rate_limit("a", 10, Duration::from_secs(60))
        .unwrap();
    assert_eq!(f.router.rate_limit_stats(Some("a"))[0].capacity, 110.0);
}

#[tokio::test]
async fn test_preferred_provider_falls_back_to_the_rest() -> anyhow::Result<()> {
    let f = simple(vec![
        ("a", MockProvider::replying("a", "from a")),
        ("b", MockProvider::unavailable("b")),
    ]);

    let id = f
        .router
        .submit(
            Intent::LlmQuery,
            json!({"prompt": "q", "provider": "b", "fallback": true}),
            "clerk",
        )
        .await?;
    let done = f.router.wait_for(&id, WAIT).await?;

    assert_eq!(done.state, CommandState::Succeeded);
    let result = done.result.unwrap();
    assert_eq!(result["result"]["provider"], "a");
    assert_eq!(result["fallback_used"], true);
    assert_eq!(result["failures"][0]["provider"], "b");
    Ok(())
}
