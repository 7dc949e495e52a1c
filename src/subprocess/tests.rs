use super::*;
use std::time::Duration;

#[tokio::test]
async fn test_production_runner_success() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::shell("bash", "echo hello world").build();

    let output = runner.run(command).await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout.trim(), "hello world");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn test_production_runner_failure() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::shell("bash", "echo oops >&2; exit 3").build();

    let output = runner.run(command).await.unwrap();
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(output.stderr.trim(), "oops");
}

#[tokio::test]
async fn test_production_runner_command_not_found() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::shell("nonexistent-shell-12345", "true").build();

    let result = runner.run(command).await;
    assert!(matches!(result, Err(ProcessError::CommandNotFound(_))));
    assert!(result.unwrap_err().is_spawn_failure());
}

#[tokio::test]
async fn test_production_runner_timeout() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::shell("bash", "sleep 5")
        .timeout(Duration::from_millis(100))
        .build();

    let result = runner.run(command).await;
    assert!(matches!(result, Err(ProcessError::Timeout(_))));
}

#[tokio::test]
async fn test_timeout_kills_whole_pipeline() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("written");
    let script = format!("echo x | (sleep 1; touch {})", marker.display());
    let command = ProcessCommandBuilder::shell("bash", &script)
        .timeout(Duration::from_millis(200))
        .build();

    let result = TokioProcessRunner.run(command).await;
    assert!(matches!(result, Err(ProcessError::Timeout(_))));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_mock_runner_matches_script() {
    let mock = MockProcessRunner::new();
    mock.expect_command()
        .with_script(|script| script.contains("--action stop"))
        .returns_exit_code(2)
        .returns_stderr("boom")
        .finish();
    mock.expect_command().returns_stdout("ok").finish();

    let failed = mock
        .run(ProcessCommandBuilder::shell("bash", "docker run img --action stop").build())
        .await
        .unwrap();
    assert_eq!(failed.status.code(), Some(2));
    assert_eq!(failed.stderr, "boom");

    let ok = mock
        .run(ProcessCommandBuilder::shell("bash", "docker run img --action start").build())
        .await
        .unwrap();
    assert!(ok.status.success());
    assert_eq!(ok.stdout, "ok");
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_mock_runner_without_expectation() {
    let mock = MockProcessRunner::new();
    let result = mock
        .run(ProcessCommandBuilder::shell("bash", "true").build())
        .await;
    assert!(matches!(result, Err(ProcessError::MockExpectationNotMet(_))));
}
