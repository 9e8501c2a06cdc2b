//! Full design/validate refinement loop against fake shell-script
//! designer and validator backends, with a fake browser for rendering.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crucible_core::{
    BackendRegistry, BackendSpec, ChromiumRenderer, Orchestrator, OrchestratorConfig, Phase,
    RefinementConfig, RefinementOutcome, VisualValidator, start_refinement,
};
use crucible_test_utils as fakes;

// ===========================================================================
// Test harness
// ===========================================================================

struct Loop {
    orchestrator: Arc<Orchestrator>,
    validator: Arc<VisualValidator>,
}

/// Wire a designer and validator script into an orchestrator plus a
/// visual validator backed by a fake browser.
fn wire(dir: &Path, designer: std::path::PathBuf, validator: std::path::PathBuf) -> Loop {
    let registry = BackendRegistry::builder()
        .register(BackendSpec::new("designer", designer))
        .register(BackendSpec::new("validator", validator))
        .build();
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(registry),
        OrchestratorConfig::default(),
    ));

    let browser = fakes::fake_browser(dir, "browser.sh");
    let renderer = ChromiumRenderer::new(browser.to_string_lossy().into_owned())
        .with_render_timeout(Duration::from_secs(5));
    let validator = Arc::new(VisualValidator::new(Box::new(renderer), "validator"));

    Loop {
        orchestrator,
        validator,
    }
}

fn config(max_iterations: u32) -> RefinementConfig {
    RefinementConfig {
        designer_backend: "designer".to_string(),
        max_iterations,
        designer_timeout: Some(Duration::from_secs(30)),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn approval_on_the_first_iteration() {
    let tmp = tempfile::tempdir().unwrap();
    let designer_calls = tmp.path().join("designer.count");
    let validator_calls = tmp.path().join("validator.count");

    let designer = fakes::counting_designer(tmp.path(), "designer.sh", &designer_calls);
    let validator = fakes::responding_validator(
        tmp.path(),
        "validator.sh",
        &validator_calls,
        "APPROVED: meets all requirements",
    );
    let wired = wire(tmp.path(), designer, validator);

    let handle = start_refinement(
        wired.orchestrator,
        wired.validator,
        "a landing page",
        config(5),
    );
    let outcome = handle.result().await;

    assert!(outcome.is_approved());
    assert_eq!(outcome.iterations(), 1);
    assert_eq!(outcome.history().len(), 1);
    assert_eq!(fakes::read_count(&designer_calls), 1);
    assert_eq!(fakes::read_count(&validator_calls), 1);
}

#[tokio::test]
async fn exhaustion_after_the_iteration_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let designer_calls = tmp.path().join("designer.count");
    let validator_calls = tmp.path().join("validator.count");

    let designer = fakes::counting_designer(tmp.path(), "designer.sh", &designer_calls);
    let validator = fakes::responding_validator(
        tmp.path(),
        "validator.sh",
        &validator_calls,
        "REJECTED: spacing is off",
    );
    let wired = wire(tmp.path(), designer, validator);

    let handle = start_refinement(
        wired.orchestrator,
        wired.validator,
        "a landing page",
        config(3),
    );
    let outcome = handle.result().await;

    match outcome {
        RefinementOutcome::Exhausted {
            feedback,
            iterations,
            history,
            ..
        } => {
            assert_eq!(iterations, 3);
            assert_eq!(history.len(), 3);
            assert!(feedback.contains("spacing is off"));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }

    // Exactly one designer and one validator call per iteration.
    assert_eq!(fakes::read_count(&designer_calls), 3);
    assert_eq!(fakes::read_count(&validator_calls), 3);
}

#[tokio::test]
async fn validator_sees_the_exact_artifact_the_designer_produced() {
    let tmp = tempfile::tempdir().unwrap();
    let designer_calls = tmp.path().join("designer.count");
    let capture = tmp.path().join("validator-input.json");

    let designer = fakes::counting_designer(tmp.path(), "designer.sh", &designer_calls);
    let validator =
        fakes::capturing_validator(tmp.path(), "validator.sh", &capture, "APPROVED");
    let wired = wire(tmp.path(), designer, validator);

    let handle = start_refinement(
        wired.orchestrator,
        wired.validator,
        "a landing page",
        config(5),
    );
    let outcome = handle.result().await;
    assert!(outcome.is_approved());

    // The payload the validator received carries the artifact unmodified.
    let payload: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&capture).unwrap()).unwrap();
    let artifact = &outcome.history()[0].artifact;
    assert_eq!(payload["html"].as_str().unwrap(), artifact.html);
    assert_eq!(payload["css"].as_str().unwrap(), artifact.css);
    assert_eq!(payload["mode"].as_str().unwrap(), "visual");
    assert!(!payload["snapshot_png_base64"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn zero_iteration_budget_is_a_configuration_error() {
    let tmp = tempfile::tempdir().unwrap();
    let designer_calls = tmp.path().join("designer.count");
    let validator_calls = tmp.path().join("validator.count");

    let designer = fakes::counting_designer(tmp.path(), "designer.sh", &designer_calls);
    let validator =
        fakes::responding_validator(tmp.path(), "validator.sh", &validator_calls, "APPROVED");
    let wired = wire(tmp.path(), designer, validator);

    let mut handle = start_refinement(
        wired.orchestrator,
        wired.validator,
        "a landing page",
        config(0),
    );
    let events = handle.events().unwrap();
    let outcome = handle.result().await;

    match outcome {
        RefinementOutcome::Error {
            error, iterations, ..
        } => {
            assert_eq!(error.code, "CONFIGURATION_ERROR");
            assert_eq!(iterations, 0);
        }
        other => panic!("expected Error, got {other:?}"),
    }

    // The session never ran; no backend was invoked.
    assert_eq!(fakes::read_count(&designer_calls), 0);
    assert_eq!(fakes::read_count(&validator_calls), 0);

    let collected: Vec<_> = events.collect().await;
    let phases: Vec<Phase> = collected.iter().map(|e| e.phase).collect();
    assert_eq!(phases, vec![Phase::Error]);
}

#[tokio::test]
async fn designer_failure_terminates_the_session_as_error() {
    let tmp = tempfile::tempdir().unwrap();
    let validator_calls = tmp.path().join("validator.count");

    let designer = fakes::failing_backend(tmp.path(), "designer.sh", 1, "no api key");
    let validator =
        fakes::responding_validator(tmp.path(), "validator.sh", &validator_calls, "APPROVED");
    let wired = wire(tmp.path(), designer, validator);

    let handle = start_refinement(
        wired.orchestrator,
        wired.validator,
        "a landing page",
        config(5),
    );
    let outcome = handle.result().await;

    match outcome {
        RefinementOutcome::Error {
            error, iterations, ..
        } => {
            assert_eq!(error.code, "AGENT_EXECUTION_ERROR");
            assert_eq!(iterations, 0);
        }
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(fakes::read_count(&validator_calls), 0);
}

#[tokio::test]
async fn progress_events_are_finite_and_end_with_one_terminal_event() {
    let tmp = tempfile::tempdir().unwrap();
    let designer_calls = tmp.path().join("designer.count");
    let validator_calls = tmp.path().join("validator.count");

    let designer = fakes::counting_designer(tmp.path(), "designer.sh", &designer_calls);
    let validator = fakes::responding_validator(
        tmp.path(),
        "validator.sh",
        &validator_calls,
        "REJECTED: try again",
    );
    let wired = wire(tmp.path(), designer, validator);

    let mut handle = start_refinement(
        wired.orchestrator,
        wired.validator,
        "a landing page",
        config(2),
    );
    let events = handle.events().unwrap();
    // Taking the stream twice is not possible.
    assert!(handle.events().is_none());

    let collected: Vec<_> = events.collect().await;
    let outcome = handle.result().await;
    assert!(!outcome.is_approved());

    // Two iterations: design, validate, design, validate, then complete.
    let phases: Vec<Phase> = collected.iter().map(|e| e.phase).collect();
    assert_eq!(
        phases,
        vec![
            Phase::Designing,
            Phase::Validating,
            Phase::Designing,
            Phase::Validating,
            Phase::Complete,
        ]
    );

    // The second design pass carries the rejection feedback forward.
    assert!(collected[0].feedback.is_none());
    assert_eq!(collected[2].iteration, 2);
    assert!(
        collected[2].feedback.as_deref().unwrap_or("").contains("try again"),
        "feedback should be routed into the next iteration"
    );

    let terminal = collected
        .iter()
        .filter(|e| matches!(e.phase, Phase::Complete | Phase::Error))
        .count();
    assert_eq!(terminal, 1);
}

#[tokio::test]
async fn cancellation_tears_down_the_running_designer() {
    let tmp = tempfile::tempdir().unwrap();
    let pidfile = tmp.path().join("pids");
    let validator_calls = tmp.path().join("validator.count");

    let designer = fakes::sleeping_backend(tmp.path(), "designer.sh", 60, &pidfile);
    let validator =
        fakes::responding_validator(tmp.path(), "validator.sh", &validator_calls, "APPROVED");
    let wired = wire(tmp.path(), designer, validator);

    let handle = start_refinement(
        wired.orchestrator,
        wired.validator,
        "a landing page",
        config(5),
    );

    // Let the designer subprocess get going, then cancel.
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.cancel();
    let outcome = handle.result().await;

    match outcome {
        RefinementOutcome::Error { error, .. } => {
            assert!(error.message.contains("cancelled"));
        }
        other => panic!("expected Error, got {other:?}"),
    }

    // The designer's whole process tree is gone shortly after.
    let pids = std::fs::read_to_string(&pidfile).unwrap();
    for pid in pids.lines().filter_map(|l| l.trim().parse::<i32>().ok()) {
        let mut dead = false;
        for _ in 0..60 {
            if !fakes::process_alive(pid) {
                dead = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(dead, "designer process {pid} survived cancellation");
    }
}
