use std::sync::Arc;
use std::time::Duration;

use citydesk_core::{config::{BucketConfig, RateLimitConfig}, Error, QuotaLimit};
use citydesk_governance::AdmissionController;

fn limit(capacity: u64, refill_tokens: u64, refill_period_secs: u64) -> QuotaLimit {
    QuotaLimit {
        capacity,
        refill_tokens,
        refill_period_secs,
    }
}

#[tokio::test(start_paused = true)]
async fn test_five_per_minute_scenario() {
    let admission = AdmissionController::new(None);
    admission.set_limit("p", "completion", limit(5, 5, 60));

    for i in 0..5 {
        assert!(admission.try_acquire("p", "completion", 1), "request {} should pass", i);
    }
    assert!(!admission.try_acquire("p", "completion", 1));

    // 12s at 5/60 tokens per second is exactly one token.
    tokio::time::advance(Duration::from_secs(12)).await;
    assert!(admission.try_acquire("p", "completion", 1));
    assert!(!admission.try_acquire("p", "completion", 1));
}

#[tokio::test(start_paused = true)]
async fn test_override_straddling_expiry() {
    let admission = AdmissionController::new(None);
    admission.set_limit("p", "completion", limit(1, 1, 1));

    admission
        .override_capacity("p", 2, Duration::from_secs(10))
        .unwrap();
    let stats = admission.stats(Some("p"));
    assert_eq!(stats[0].capacity, 3.0);
    assert_eq!(stats[0].available, 3.0);

    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(admission.try_acquire("p", "completion", 3));

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(!admission.try_acquire("p", "completion", 2));
    assert!(admission.try_acquire("p", "completion", 1));

    let stats = admission.stats(Some("p"));
    assert_eq!(stats[0].capacity, 1.0);
    assert!(stats[0].override_expires_in_secs.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_override_applies_to_every_endpoint_of_provider() {
    let admission = AdmissionController::new(None);
    admission.set_limit("p", "completion", limit(1, 0, 60));
    admission.set_limit("p", "embedding", limit(2, 0, 60));
    admission.set_limit("q", "completion", limit(1, 0, 60));

    admission
        .override_capacity("p", 4, Duration::from_secs(30))
        .unwrap();

    let stats = admission.stats(None);
    let caps: Vec<(String, String, f64)> = stats
        .iter()
        .map(|s| (s.provider.clone(), s.endpoint.clone(), s.capacity))
        .collect();
    assert_eq!(
        caps,
        vec![
            ("p".to_string(), "completion".to_string(), 5.0),
            ("p".to_string(), "embedding".to_string(), 6.0),
            ("q".to_string(), "completion".to_string(), 1.0),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_override_unknown_provider_is_not_found() {
    let admission = AdmissionController::new(Some(QuotaLimit::per_minute(10)));
    let err = admission
        .override_capacity("nobody", 1, Duration::from_secs(5))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test(start_paused = true)]
async fn test_buckets_are_independent() {
    let admission = AdmissionController::new(None);
    admission.set_limit("a", "completion", limit(1, 1, 60));
    admission.set_limit("b", "completion", limit(1, 1, 60));

    assert!(admission.try_acquire("a", "completion", 1));
    assert!(!admission.try_acquire("a", "completion", 1));
    assert!(admission.try_acquire("b", "completion", 1));
}

#[tokio::test(start_paused = true)]
async fn test_acquire_error_names_bucket() {
    let admission = AdmissionController::new(None);
    admission.set_limit("a", "completion", limit(0, 0, 60));

    match admission.acquire("a", "completion", 1) {
        Err(Error::RateLimited { provider, endpoint }) => {
            assert_eq!(provider, "a");
            assert_eq!(endpoint, "completion");
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_available_stays_within_bounds() {
    let admission = AdmissionController::new(None);
    admission.set_limit("p", "completion", limit(4, 2, 1));

    let costs = [1, 3, 2, 5, 1, 1, 4, 2, 0, 3];
    for (i, cost) in costs.iter().enumerate() {
        admission.try_acquire("p", "completion", *cost);
        let s = &admission.stats(Some("p"))[0];
        assert!(s.available >= 0.0 && s.available <= s.capacity, "step {}", i);
        tokio::time::advance(Duration::from_millis(700)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquisitions_never_overdraw() {
    let admission = Arc::new(AdmissionController::new(None));
    admission.set_limit("p", "completion", limit(10, 0, 60));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let admission = admission.clone();
        handles.push(tokio::spawn(async move {
            admission.try_acquire("p", "completion", 1)
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 10);
}

#[tokio::test(start_paused = true)]
async fn test_from_config_declares_buckets() {
    let config = RateLimitConfig {
        default_limit: None,
        buckets: vec![BucketConfig {
            provider: "openai".into(),
            endpoint: "completion".into(),
            limit: limit(2, 2, 60),
        }],
    };
    let admission = AdmissionController::from_config(&config);

    assert!(admission.has_provider("openai"));
    assert!(!admission.try_acquire("gemini", "completion", 1));
    assert!(admission.try_acquire("openai", "completion", 2));
}
