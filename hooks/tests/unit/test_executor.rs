//! Deploy script executor tests against real child processes

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use catloader_hooks::deploy::executor::{Executor, ExecutorOptions, ScriptExecutor};
use catloader_hooks::deploy::queue::DeploymentQueue;
use catloader_hooks::errors::DeployError;
use catloader_hooks::models::deployment::{DeploymentTask, Environment};
use catloader_hooks::telemetry::Metrics;

fn write_script(repo: &Path, body: &str, mode: u32) -> PathBuf {
    let scripts = repo.join("scripts");
    std::fs::create_dir_all(&scripts).unwrap();
    let script = scripts.join("deploy.sh");
    std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(mode)).unwrap();
    script
}

fn executor(timeout: Duration) -> ScriptExecutor {
    ScriptExecutor::new(ExecutorOptions {
        timeout,
        kill_grace: Duration::from_millis(200),
        mirror_output: false,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_success_captures_output_with_marker_in_repo_dir() {
    let repo = tempfile::tempdir().unwrap();
    write_script(
        repo.path(),
        "echo \"marker=$CATLOADER_AUTO_DEPLOY\"\necho \"cwd=$(pwd)\"\necho oops >&2",
        0o755,
    );
    let task = DeploymentTask::new("main", repo.path());

    let output = executor(Duration::from_secs(10))
        .execute(&task)
        .await
        .unwrap();

    assert!(output.contains("marker=1"));
    let canonical = repo.path().canonicalize().unwrap();
    assert!(output.contains(&format!("cwd={}", canonical.display())));
    assert!(output.contains("oops"));
}

#[tokio::test]
async fn test_non_zero_exit_fails_with_code() {
    let repo = tempfile::tempdir().unwrap();
    write_script(repo.path(), "echo partial\nexit 3", 0o755);
    let task = DeploymentTask::new("dev", repo.path());

    let err = executor(Duration::from_secs(10))
        .execute(&task)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::DeployFailed { exit_code: Some(3) }));
}

#[tokio::test]
async fn test_timeout_kills_the_script() {
    let repo = tempfile::tempdir().unwrap();
    write_script(repo.path(), "exec sleep 30", 0o755);
    let task = DeploymentTask::new("main", repo.path());

    let started = Instant::now();
    let err = executor(Duration::from_millis(200))
        .execute(&task)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::DeployTimeout(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_script_ignoring_sigterm_is_force_killed() {
    let repo = tempfile::tempdir().unwrap();
    write_script(
        repo.path(),
        "trap '' TERM\nwhile true; do sleep 0.05; done",
        0o755,
    );
    let task = DeploymentTask::new("main", repo.path());

    let started = Instant::now();
    let err = executor(Duration::from_millis(200))
        .execute(&task)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::DeployTimeout(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_non_executable_script_is_a_spawn_error() {
    let repo = tempfile::tempdir().unwrap();
    write_script(repo.path(), "echo never", 0o644);
    let task = DeploymentTask::new("main", repo.path());

    let err = executor(Duration::from_secs(10))
        .execute(&task)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::SpawnError(_)));
}

#[tokio::test]
async fn test_queue_progresses_after_a_timed_out_deployment() {
    let repo = tempfile::tempdir().unwrap();
    let marker = repo.path().join("second-ran");
    // First run hangs; later runs record that they happened.
    write_script(
        repo.path(),
        &format!(
            "if [ -f first-done ]; then touch {}; exit 0; fi\ntouch first-done\nexec sleep 30",
            marker.display()
        ),
        0o755,
    );

    let metrics = Arc::new(Metrics::new());
    let queue = Arc::new(DeploymentQueue::new(
        Arc::new(executor(Duration::from_millis(300))),
        metrics.clone(),
    ));

    let first = queue.submit(DeploymentTask::new("main", repo.path()));
    let second = queue.submit(DeploymentTask::new("main", repo.path()));
    assert_eq!(queue.status(Environment::Prod).queue_depth, 1);

    assert!(matches!(first.await, Err(DeployError::DeployTimeout(_))));
    assert!(second.await.is_ok());
    assert!(marker.exists());

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_deployments, 2);
    assert_eq!(snapshot.failed_deployments, 1);
    assert_eq!(snapshot.successful_deployments, 1);
    assert_eq!(snapshot.success_rate, "50.00");
}
