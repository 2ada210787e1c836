mod common;

use std::time::Duration;

use common::{FixedDetector, Harness, RecordingExecutor};
use serena_cli::environment::InstallationMethod;
use serena_cli::errors::SerenaError;
use serena_cli::installer::{Executor, InstallationExecutor};

fn detector(project: &std::path::Path) -> FixedDetector {
    FixedDetector {
        current: Some(project.to_path_buf()),
        has_serena: false,
    }
}

#[tokio::test]
async fn test_enable_short_circuits_when_installed() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(common::linux_snapshot("3.12.0"), RecordingExecutor::installed(), detector(dir.path()));

    let report = harness.manager.enable(None, false).await.unwrap();

    assert!(report.already_installed);
    assert!(report.attempts.is_empty());
    assert!(harness.executor.install_calls().is_empty());

    let config = harness.config.project(dir.path()).unwrap();
    assert_eq!(config["serena"]["enabled"], serde_json::json!(true));
    assert!(config["serena"]["enabled_at"].is_string());
}

#[tokio::test]
async fn test_force_reinstalls() {
    let dir = tempfile::tempdir().unwrap();
    let mut executor = RecordingExecutor::installed();
    executor.succeeding_methods = vec!["uv".to_string()];
    let harness = Harness::new(common::linux_snapshot("3.12.0"), executor, detector(dir.path()));

    let report = harness.manager.enable(Some(dir.path()), true).await.unwrap();

    assert!(report.forced);
    assert!(!report.already_installed);
    assert_eq!(report.installed_with.as_deref(), Some("uv"));
    assert_eq!(harness.executor.install_calls(), vec!["uv"]);
}

#[tokio::test]
async fn test_falls_back_to_next_method() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        common::linux_snapshot("3.11.2"),
        RecordingExecutor::succeeding(&["pip"]),
        detector(dir.path()),
    );

    let report = harness.manager.enable(None, false).await.unwrap();

    assert_eq!(harness.executor.install_calls(), vec!["uv", "venv", "pip"]);
    assert_eq!(harness.executor.working_dir_of("venv").as_deref(), Some(dir.path()));
    assert_eq!(report.installed_with.as_deref(), Some("pip"));
    assert_eq!(report.attempts.len(), 3);
    assert!(!report.attempts[0].outcome.succeeded);

    let config = harness.config.project(dir.path()).unwrap();
    assert_eq!(config["serena"]["installed_with"], serde_json::json!("pip"));
}

#[tokio::test]
async fn test_all_methods_failing_reports_every_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        common::linux_snapshot("3.13.0"),
        RecordingExecutor::default(),
        detector(dir.path()),
    );

    let err = harness.manager.enable(None, false).await.unwrap_err();
    let serena_error = err.downcast_ref::<SerenaError>().unwrap();
    assert!(matches!(serena_error, SerenaError::InstallationFailed(_)));

    let message = err.to_string();
    assert!(message.contains("[uv] exit code 1: uv failed"));
    assert!(message.contains("[pip] exit code 1: pip failed"));
    assert!(message.contains("--python 3.11"));
    assert!(harness.config.project(dir.path()).is_none());
}

#[tokio::test]
async fn test_venv_install_counts_as_installed() {
    let dir = tempfile::tempdir().unwrap();
    let bin = if cfg!(target_os = "windows") {
        dir.path().join(".serena-venv").join("Scripts")
    } else {
        dir.path().join(".serena-venv").join("bin")
    };
    std::fs::create_dir_all(&bin).unwrap();
    let entry = if cfg!(target_os = "windows") { "serena.exe" } else { "serena" };
    std::fs::write(bin.join(entry), "").unwrap();

    let harness = Harness::new(common::linux_snapshot("3.12.0"), RecordingExecutor::default(), detector(dir.path()));

    let status = harness.manager.status(Some(dir.path())).await.unwrap();
    assert!(status.serena_installed);

    let report = harness.manager.enable(Some(dir.path()), false).await.unwrap();
    assert!(report.already_installed);
    assert!(harness.executor.install_calls().is_empty());
}

#[tokio::test]
async fn test_enable_requires_existing_project() {
    let harness = Harness::new(
        common::linux_snapshot("3.11.2"),
        RecordingExecutor::installed(),
        FixedDetector {
            current: None,
            has_serena: false,
        },
    );

    let err = harness.manager.enable(None, false).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<SerenaError>(), Some(SerenaError::ProjectNotFound(_))));

    let missing = std::path::Path::new("/definitely/not/a/project");
    let err = harness.manager.enable(Some(missing), false).await.unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[tokio::test]
async fn test_snapshot_captured_once() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(common::linux_snapshot("3.12.3"), RecordingExecutor::installed(), detector(dir.path()));

    let first = harness.manager.snapshot().await.unwrap();
    let second = harness.manager.snapshot().await.unwrap();
    assert!(std::ptr::eq(first, second));
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_twice_is_not_fatal() {
    let executor = InstallationExecutor::new();
    let method = InstallationMethod::new("pip", "already installed target", "echo 'Requirement already satisfied'");

    for _ in 0..2 {
        let outcome = executor.execute(&method, None, Duration::from_secs(10)).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.stdout.contains("already satisfied"));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_binary_is_structured_failure() {
    let executor = InstallationExecutor::new();
    let method = InstallationMethod::new("uv", "missing binary", "definitely-not-a-real-binary-xyz --version");

    let outcome = executor.execute(&method, None, Duration::from_secs(10)).await;
    assert!(!outcome.succeeded);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.exit_code, Some(127));
}
