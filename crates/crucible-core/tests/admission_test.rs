//! Concurrency-cap behavior of the orchestrator under load.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use crucible_core::{
    BackendRegistry, BackendSpec, ExecutionRequest, Orchestrator, OrchestratorConfig,
};
use crucible_test_utils as fakes;

fn sleeper_registry(dir: &std::path::Path, sleep_secs: u64) -> Arc<BackendRegistry> {
    let program = fakes::write_backend_script(
        dir,
        "sleeper.sh",
        &format!("sleep {sleep_secs}\nprintf '{{\"ok\":true}}' > \"$OUTPUT\"\n"),
    );
    Arc::new(
        BackendRegistry::builder()
            .register(BackendSpec::new("sleeper", program))
            .build(),
    )
}

#[tokio::test]
async fn zero_wait_budget_rejects_the_overflow_request() {
    let tmp = tempfile::tempdir().unwrap();
    let orch = Arc::new(Orchestrator::new(
        sleeper_registry(tmp.path(), 2),
        OrchestratorConfig {
            max_concurrent: 2,
            admission_wait: Duration::ZERO,
        },
    ));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move {
            orch.execute(ExecutionRequest::execute("sleeper", json!({})))
                .await
        }));
        // Stagger so the first two hold slots before the third arrives.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let mut successes = 0;
    let mut limited = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        match result.error_code() {
            None => successes += 1,
            Some("RESOURCE_LIMIT_ERROR") => limited += 1,
            Some(other) => panic!("unexpected error code {other}"),
        }
    }

    assert_eq!(successes, 2);
    assert_eq!(limited, 1);
}

#[tokio::test]
async fn requests_queue_within_the_wait_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let orch = Arc::new(Orchestrator::new(
        sleeper_registry(tmp.path(), 1),
        OrchestratorConfig {
            max_concurrent: 1,
            admission_wait: Duration::from_secs(30),
        },
    ));

    let started = Instant::now();
    let first = {
        let orch = Arc::clone(&orch);
        tokio::spawn(
            async move { orch.execute(ExecutionRequest::execute("sleeper", json!({}))).await },
        )
    };
    let second = {
        let orch = Arc::clone(&orch);
        tokio::spawn(
            async move { orch.execute(ExecutionRequest::execute("sleeper", json!({}))).await },
        )
    };

    assert!(first.await.unwrap().is_success());
    assert!(second.await.unwrap().is_success());

    // Capacity 1 serializes the two one-second executions.
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn waiting_longer_than_the_budget_is_resource_limited() {
    let tmp = tempfile::tempdir().unwrap();
    let orch = Arc::new(Orchestrator::new(
        sleeper_registry(tmp.path(), 3),
        OrchestratorConfig {
            max_concurrent: 1,
            admission_wait: Duration::from_millis(300),
        },
    ));

    let holder = {
        let orch = Arc::clone(&orch);
        tokio::spawn(
            async move { orch.execute(ExecutionRequest::execute("sleeper", json!({}))).await },
        )
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = orch
        .execute(ExecutionRequest::execute("sleeper", json!({})))
        .await;
    assert_eq!(result.error_code(), Some("RESOURCE_LIMIT_ERROR"));

    assert!(holder.await.unwrap().is_success());
}
