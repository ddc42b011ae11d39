//! Script dispatcher tests against real child processes.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use deploy_webhook::api::create_router;
use deploy_webhook::dispatch::{Dispatcher, ScriptDispatcher};
use deploy_webhook::error::DispatchError;
use deploy_webhook::webhook::{Action, WebhookEvent};
use deploy_webhook::{AppState, WebhookConfig};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tower::ServiceExt;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("deploy.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    path
}

fn sh_dispatcher(dir: &TempDir, body: &str) -> ScriptDispatcher {
    ScriptDispatcher::new(write_script(dir.path(), body))
        .with_interpreter("sh")
        .with_working_dir(dir.path())
}

fn event(owner: &str, app: &str) -> WebhookEvent {
    WebhookEvent {
        owner_name: owner.to_string(),
        app_name: app.to_string(),
        action: Action::Pull,
        raw_payload: Value::Null,
    }
}

#[tokio::test]
async fn passes_positional_arguments_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = sh_dispatcher(&dir, r#"printf '%s|' "$@""#);

    let result = dispatcher.dispatch(&event("alice", "myapp")).await.unwrap();
    assert!(result.success());
    assert_eq!(result.stdout, "webhook|alice|myapp|pull|");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
async fn captures_stdout_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = sh_dispatcher(&dir, "echo deployed");

    let result = dispatcher.dispatch(&event("alice", "myapp")).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "deployed\n");
}

#[tokio::test]
async fn captures_stderr_and_exit_code_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = sh_dispatcher(&dir, "echo 'build failed' >&2\nexit 3");

    let result = dispatcher.dispatch(&event("alice", "myapp")).await.unwrap();
    assert!(!result.success());
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stderr, "build failed\n");
}

#[tokio::test]
async fn killed_script_reports_negative_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = sh_dispatcher(&dir, "kill -9 $$");

    let result = dispatcher.dispatch(&event("alice", "myapp")).await.unwrap();
    assert_eq!(result.exit_code, -1);
    assert!(!result.success());
}

#[tokio::test]
async fn hostile_values_are_never_interpreted_by_a_shell() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = sh_dispatcher(&dir, r#"printf '%s' "$3""#);
    let hostile = r#"app"; touch pwned; echo "$(touch pwned2)"#;

    let result = dispatcher.dispatch(&event("alice", hostile)).await.unwrap();
    assert!(result.success());
    assert_eq!(result.stdout, hostile);
    assert!(!dir.path().join("pwned").exists());
    assert!(!dir.path().join("pwned2").exists());
}

#[tokio::test]
async fn runs_in_configured_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = sh_dispatcher(&dir, "pwd");

    let result = dispatcher.dispatch(&event("alice", "myapp")).await.unwrap();
    let reported = Path::new(result.stdout.trim()).canonicalize().unwrap();
    assert_eq!(reported, dir.path().canonicalize().unwrap());
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = ScriptDispatcher::new(dir.path().join("missing.sh"));

    let err = dispatcher
        .dispatch(&event("alice", "myapp"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Spawn(_)), "got {err:?}");

    let dispatcher = ScriptDispatcher::new(write_script(dir.path(), "true"))
        .with_interpreter("definitely-not-an-interpreter");
    let err = dispatcher
        .dispatch(&event("alice", "myapp"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Spawn(_)), "got {err:?}");
}

#[tokio::test]
async fn slow_script_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let limit = Duration::from_millis(200);
    let dispatcher = sh_dispatcher(&dir, "sleep 5").with_timeout(limit);

    let started = Instant::now();
    let err = dispatcher
        .dispatch(&event("alice", "myapp"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::TimedOut(d) if d == limit), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_dispatches_do_not_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = sh_dispatcher(&dir, "sleep 1\necho done");

    let event_a = event("alice", "one");
    let event_b = event("bob", "two");
    let started = Instant::now();
    let (a, b) = tokio::join!(
        dispatcher.dispatch(&event_a),
        dispatcher.dispatch(&event_b),
    );
    assert_eq!(a.unwrap().stdout, "done\n");
    assert_eq!(b.unwrap().stdout, "done\n");
    assert!(started.elapsed() < Duration::from_millis(1900));
}

#[tokio::test]
async fn end_to_end_request_runs_script() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = sh_dispatcher(
        &dir,
        r#"if [ "$3" = "myapp" ]; then echo deployed; else echo "unknown app $3" >&2; exit 1; fi"#,
    );
    let app = create_router(Arc::new(AppState::new(
        WebhookConfig::default(),
        Arc::new(dispatcher),
    )));

    for (app_name, expected_status, expected_body) in [
        ("myapp", StatusCode::OK, json!({ "message": "deployed" })),
        (
            "other",
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "unknown app other" }),
        ),
    ] {
        let payload = json!({ "repository": { "name": app_name, "owner": { "name": "alice" } } });
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from(payload.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected_status);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, expected_body);
    }
}
