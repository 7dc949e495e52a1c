use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

/// Scripted [`ProcessRunner`] for exercising executors without spawning
/// real shells.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct MockExpectation {
    #[allow(clippy::type_complexity)]
    script_matcher: Option<Box<dyn Fn(&str) -> bool + Send + Sync>>,
    response: ProcessOutput,
    delay: Option<Duration>,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start scripting the response for the next matching command.
    pub fn expect_command(&self) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                script_matcher: None,
                response: ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::from_millis(10),
                },
                delay: None,
            },
        }
    }

    pub fn call_count(&self) -> usize {
        self.lock_history().len()
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.lock_history().clone()
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<ProcessCommand>> {
        self.call_history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.lock_history().push(command.clone());

        let script = command.script.clone();
        let matched = {
            let expectations = self
                .expectations
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            expectations
                .iter()
                .find(|e| e.script_matcher.as_ref().is_none_or(|m| m(&script)))
                .map(|e| (e.response.clone(), e.delay))
        };

        match matched {
            Some((response, delay)) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(response)
            }
            None => Err(ProcessError::MockExpectationNotMet(format!(
                "No expectation found for command: {}",
                command.display_redacted()
            ))),
        }
    }
}

impl MockCommandConfig {
    pub fn with_script<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.expectation.script_matcher = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.response.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.response.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.expectation.delay = Some(delay);
        self
    }

    pub fn finish(self) {
        self.runner
            .expectations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(self.expectation);
    }
}
