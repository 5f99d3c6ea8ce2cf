use std::path::PathBuf;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use prompt_runner_mock::MockRunner;
use prompt_state::{
    cancel_signal, refine, RestoreCoordinator, RestoreRequest, RunError, SnapshotStore,
    StateBundle, LATEST_FILE_NAME,
};
use tempfile::TempDir;

fn stored_state(scope_key: &str) -> (TempDir, PathBuf, StateBundle) {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let dir = temp.path().join("state");
    let bundle = StateBundle::with_created_at(
        "2026-02-14T00:00:00Z",
        "0.1.0",
        "model-a",
        "https://api.example.test/v1",
        "tools-1",
        scope_key,
    )
    .with_prompt("developer", "Stored developer prompt.");
    SnapshotStore::new(&dir)
        .save(&bundle)
        .expect("seed bundle should save");
    (temp, dir, bundle)
}

fn collect_warnings(
    coordinator: &RestoreCoordinator<&MockRunner>,
    request: &RestoreRequest,
) -> (Result<prompt_state::RestoreOutcome, RunError>, Vec<String>) {
    let mut warnings = Vec::new();
    let result = coordinator.run_with_warnings(request, cancel_signal(), &mut |message| {
        warnings.push(message.to_string())
    });
    (result, warnings)
}

#[test]
fn matching_scope_restores_without_invoking_runner() {
    let (_temp, dir, bundle) = stored_state("scope-1");
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);

    let request = RestoreRequest::new("default prompt")
        .with_state_dir(&dir)
        .with_scope_key("scope-1");
    let (result, warnings) = collect_warnings(&coordinator, &request);
    let outcome = result.expect("restore should succeed");

    assert!(outcome.used_restore);
    assert_eq!(outcome.bundle, Some(bundle));
    assert_eq!(outcome.prompt_sent, None);
    assert_eq!(outcome.output, None);
    assert_eq!(runner.call_count(), 0);
    assert!(warnings.is_empty());
}

#[test]
fn no_requested_scope_accepts_any_stored_bundle() {
    let (_temp, dir, _bundle) = stored_state("scope-1");
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);

    let outcome = coordinator
        .run(&RestoreRequest::new("default").with_state_dir(&dir), cancel_signal())
        .expect("restore should succeed");

    assert!(outcome.used_restore);
    assert_eq!(runner.call_count(), 0);
}

#[test]
fn mismatched_scope_runs_live_exactly_once() {
    let (_temp, dir, _bundle) = stored_state("scope-1");
    let runner = MockRunner::with_responses(vec!["fresh".to_string()]);
    let coordinator = RestoreCoordinator::new(&runner);

    let outcome = coordinator
        .run(
            &RestoreRequest::new("default prompt")
                .with_state_dir(&dir)
                .with_scope_key("other-scope"),
            cancel_signal(),
        )
        .expect("live run should succeed");

    assert!(!outcome.used_restore);
    assert_eq!(outcome.bundle, None);
    assert_eq!(outcome.prompt_sent.as_deref(), Some("default prompt"));
    assert_eq!(outcome.output.as_deref(), Some("fresh"));
    assert_eq!(runner.calls(), vec!["default prompt".to_string()]);
}

#[test]
fn override_with_refine_runs_override_and_warns_once() {
    let (_temp, dir, _bundle) = stored_state("scope-1");
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);

    let request = RestoreRequest::new("default prompt")
        .with_state_dir(&dir)
        .with_scope_key("scope-1")
        .with_refine(true)
        .with_override_prompts(vec!["OVERRIDE".to_string()]);
    let (result, warnings) = collect_warnings(&coordinator, &request);
    let outcome = result.expect("live run should succeed");

    assert!(!outcome.used_restore);
    assert_eq!(runner.calls(), vec!["OVERRIDE".to_string()]);
    assert_eq!(warnings.len(), 1);
    let warning = warnings[0].to_lowercase();
    assert!(warning.contains("override"));
    assert!(warning.contains("refine"));
}

#[test]
fn override_without_refine_beats_matching_stored_state() {
    let (_temp, dir, _bundle) = stored_state("scope-1");
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);

    let request = RestoreRequest::new("default prompt")
        .with_state_dir(&dir)
        .with_scope_key("scope-1")
        .with_override_prompts(vec!["OVERRIDE".to_string()])
        .with_override_file_text("extra from file");
    let (result, warnings) = collect_warnings(&coordinator, &request);

    let outcome = result.expect("live run should succeed");
    assert!(!outcome.used_restore);
    assert_eq!(
        outcome.prompt_sent.as_deref(),
        Some("OVERRIDE\n\nextra from file")
    );
    assert!(warnings.is_empty());
}

#[test]
fn blank_overrides_do_not_count_as_overrides() {
    let (_temp, dir, _bundle) = stored_state("scope-1");
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);

    let request = RestoreRequest::new("default prompt")
        .with_state_dir(&dir)
        .with_override_prompts(vec!["   ".to_string()]);

    let outcome = coordinator
        .run(&request, cancel_signal())
        .expect("restore should succeed");

    assert!(outcome.used_restore);
    assert_eq!(runner.call_count(), 0);
}

#[test]
fn refine_skips_restore_and_runs_default_prompt() {
    let (_temp, dir, _bundle) = stored_state("scope-1");
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);

    let request = RestoreRequest::new("default prompt")
        .with_state_dir(&dir)
        .with_scope_key("scope-1")
        .with_refine(true);
    let (result, warnings) = collect_warnings(&coordinator, &request);

    let outcome = result.expect("live run should succeed");
    assert!(!outcome.used_restore);
    assert_eq!(runner.calls(), vec!["default prompt".to_string()]);
    assert!(warnings.is_empty());
}

#[test]
fn corrupt_state_falls_back_to_live_run_silently() {
    let (_temp, dir, _bundle) = stored_state("scope-1");
    std::fs::write(dir.join(LATEST_FILE_NAME), "{ broken").expect("corrupt pointer");
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);

    let request = RestoreRequest::new("default prompt")
        .with_state_dir(&dir)
        .with_scope_key("scope-1");
    let (result, warnings) = collect_warnings(&coordinator, &request);

    assert!(!result.expect("live run should succeed").used_restore);
    assert_eq!(runner.call_count(), 1);
    assert!(warnings.is_empty());
}

#[test]
fn missing_state_directory_falls_back_to_live_run() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);

    let outcome = coordinator
        .run(
            &RestoreRequest::new("p").with_state_dir(temp.path().join("missing")),
            cancel_signal(),
        )
        .expect("live run should succeed");

    assert!(!outcome.used_restore);
    assert_eq!(runner.call_count(), 1);
}

#[test]
fn runner_errors_propagate_verbatim_without_retry() {
    let runner = MockRunner::failing(RunError::failed("upstream 503"));
    let coordinator = RestoreCoordinator::new(&runner);

    let error = coordinator
        .run(&RestoreRequest::new("p"), cancel_signal())
        .expect_err("runner failure must surface");

    assert_eq!(error, RunError::Failed("upstream 503".to_string()));
    assert_eq!(runner.call_count(), 1);
}

#[test]
fn cancellation_is_passed_through_to_the_runner() {
    let runner = MockRunner::new();
    let coordinator = RestoreCoordinator::new(&runner);
    let cancel = cancel_signal();
    cancel.store(true, Ordering::SeqCst);

    let error = coordinator
        .run(&RestoreRequest::new("p"), cancel)
        .expect_err("cancelled run must surface");

    assert_eq!(error, RunError::Cancelled);
}

#[test]
fn live_output_can_be_refined_and_saved_for_the_next_restore() {
    let (_temp, dir, _bundle) = stored_state("scope-1");
    let store = SnapshotStore::new(&dir);
    let runner = MockRunner::with_responses(vec!["answer".to_string()]);
    let coordinator = RestoreCoordinator::new(&runner);

    let request = RestoreRequest::new("improve the prompt")
        .with_state_dir(&dir)
        .with_refine(true);
    let outcome = coordinator
        .run(&request, cancel_signal())
        .expect("live run should succeed");

    let previous = store.load_latest().expect("stored bundle");
    let refined = refine(
        &previous,
        "Incorporate the latest answer.",
        outcome.output.as_deref().unwrap_or_default(),
    )
    .expect("refine should succeed");
    store.save(&refined).expect("refined bundle should save");

    let restored = coordinator
        .run(&RestoreRequest::new("unused").with_state_dir(&dir), cancel_signal())
        .expect("restore should succeed");

    assert!(restored.used_restore);
    assert_eq!(runner.call_count(), 1);
    let bundle = restored.bundle.expect("restored bundle");
    assert_eq!(bundle.prompts["developer"], refined.prompts["developer"]);
    assert!(bundle.prompts["developer"].ends_with("User request: answer"));
}
