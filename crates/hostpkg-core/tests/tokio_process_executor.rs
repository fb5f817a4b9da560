#![cfg(unix)]

use std::time::Duration;

use hostpkg_core::execution::{
    CommandSpec, ProcessExitStatus, ProcessSpawnRequest, TokioProcessExecutor, spawn_validated,
};
use hostpkg_core::models::CoreErrorKind;

fn sh(script: &str) -> ProcessSpawnRequest {
    ProcessSpawnRequest::new(CommandSpec::new("/bin/sh").args(["-c", script]))
}

fn sleep_request() -> ProcessSpawnRequest {
    ProcessSpawnRequest::new(CommandSpec::new("/bin/sleep").arg("30"))
}

#[tokio::test]
async fn spawns_shell_and_captures_both_streams() {
    let executor = TokioProcessExecutor;
    let handle =
        spawn_validated(&executor, sh("echo hello; echo oops >&2")).expect("spawn should succeed");

    assert!(handle.pid().is_some());

    let output = handle.wait().await.expect("wait should succeed");
    assert_eq!(output.status, ProcessExitStatus::ExitCode(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
}

#[tokio::test]
async fn captures_nonzero_exit_code() {
    let executor = TokioProcessExecutor;
    let handle = spawn_validated(&executor, sh("exit 7")).expect("spawn should succeed");
    let output = handle.wait().await.expect("wait should succeed");

    assert_eq!(output.status, ProcessExitStatus::ExitCode(7));
}

#[tokio::test]
async fn timeout_kills_long_running_process() {
    let executor = TokioProcessExecutor;
    let request = sleep_request().timeout(Duration::from_millis(100));

    let handle = spawn_validated(&executor, request).expect("spawn should succeed");
    let error = handle.wait().await.expect_err("should timeout");

    assert_eq!(error.kind, CoreErrorKind::Timeout);
}

#[tokio::test]
async fn output_written_by_a_short_lived_descendant_is_collected() {
    let executor = TokioProcessExecutor;
    let handle = spawn_validated(&executor, sh("echo first; (sleep 0.2; echo second) & exit 0"))
        .expect("spawn should succeed");

    let output = handle.wait().await.expect("wait should succeed");
    assert_eq!(output.status, ProcessExitStatus::ExitCode(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "first\nsecond\n");
}

#[tokio::test]
async fn stream_held_open_past_exit_is_a_transport_failure() {
    let executor = TokioProcessExecutor;
    let handle = spawn_validated(&executor, sh("echo which_snap_rc=1; (sleep 3 &); exit 0"))
        .expect("spawn should succeed");

    let error = handle
        .wait()
        .await
        .expect_err("truncated output must not be reported as success");
    assert_eq!(error.kind, CoreErrorKind::Transport);
    assert!(error.message.contains("stdout"), "{}", error.message);
}

#[tokio::test]
async fn partial_listing_behind_a_lingering_descendant_is_not_returned() {
    let executor = TokioProcessExecutor;
    let handle = spawn_validated(
        &executor,
        sh("echo 'Name Version'; echo 'hello 1.0'; (sleep 3 &); exit 0"),
    )
    .expect("spawn should succeed");

    let error = handle.wait().await.expect_err("listing was never completed");
    assert_eq!(error.kind, CoreErrorKind::Transport);
}

#[tokio::test]
async fn lingering_descendant_is_killed_with_the_group() {
    let marker = std::env::temp_dir().join(format!(
        "hostpkg-linger-marker-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&marker);
    let script = format!("(sleep 2; touch '{}') & exit 0", marker.display());

    let executor = TokioProcessExecutor;
    let handle = spawn_validated(&executor, sh(&script)).expect("spawn should succeed");
    let error = handle.wait().await.expect_err("descendant holds stdout");
    assert_eq!(error.kind, CoreErrorKind::Transport);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "descendant survived the group kill");
}

#[tokio::test]
async fn spawn_nonexistent_program_is_a_transport_failure() {
    let executor = TokioProcessExecutor;
    let request = ProcessSpawnRequest::new(CommandSpec::new("/nonexistent/binary"));

    let error = match spawn_validated(&executor, request) {
        Err(e) => e,
        Ok(_) => panic!("expected spawn to fail for nonexistent binary"),
    };

    assert_eq!(error.kind, CoreErrorKind::Transport);
}

#[tokio::test]
async fn zero_timeout_is_rejected_before_spawn() {
    let executor = TokioProcessExecutor;
    let request = sleep_request().timeout(Duration::ZERO);

    let error = match spawn_validated(&executor, request) {
        Err(e) => e,
        Ok(_) => panic!("expected validation to fail"),
    };

    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
}
