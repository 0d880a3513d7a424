//! Test case execution
//!
//! A test case runs its top-level actions in order against one shared
//! context. The first failure ends the main phase; `finally` actions always
//! run afterwards.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actions::TestAction;
use crate::common::Error;
use crate::context::TestContext;

/// Lifecycle of a test case; `Success` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseState {
    Created,
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for TestCaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a test case run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub state: TestCaseState,
    /// Top-level actions started, including the failing one
    pub actions_run: usize,
    pub actions_total: usize,
    pub error: Option<Error>,
    pub duration: Duration,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.state == TestCaseState::Success
    }
}

#[derive(Debug)]
pub struct TestCase {
    name: String,
    actions: Vec<TestAction>,
    finally: Vec<TestAction>,
    state: TestCaseState,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            finally: Vec::new(),
            state: TestCaseState::Created,
        }
    }

    pub fn action(mut self, action: impl Into<TestAction>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Add an action that runs after the main actions whatever their outcome
    pub fn finally(mut self, action: impl Into<TestAction>) -> Self {
        self.finally.push(action.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TestCaseState {
        self.state
    }

    /// Run the test case once
    ///
    /// A case that already left `Created` is not run again; the result
    /// reports it as failed with an internal error.
    pub async fn execute(&mut self, context: Arc<TestContext>) -> TestResult {
        let started = Instant::now();
        let actions_total = self.actions.len();

        if self.state != TestCaseState::Created {
            return TestResult {
                name: self.name.clone(),
                state: TestCaseState::Failed,
                actions_run: 0,
                actions_total,
                error: Some(Error::Internal(format!(
                    "test case '{}' already {}",
                    self.name, self.state
                ))),
                duration: started.elapsed(),
            };
        }

        self.state = TestCaseState::Running;
        tracing::info!(test = %self.name, actions = actions_total, "test case started");

        let mut actions_run = 0;
        let mut error = None;
        for action in &self.actions {
            actions_run += 1;
            if let Err(e) = action.execute(&context).await {
                tracing::error!(test = %self.name, action = action.name(), error = %e, "action failed");
                error = Some(e);
                break;
            }
        }

        for action in &self.finally {
            if let Err(e) = action.execute(&context).await {
                if error.is_none() {
                    error = Some(e);
                } else {
                    tracing::warn!(test = %self.name, error = %e, "finally action failed");
                }
            }
        }

        self.state = match error {
            None => TestCaseState::Success,
            Some(_) => TestCaseState::Failed,
        };
        let duration = started.elapsed();
        tracing::info!(
            test = %self.name,
            state = %self.state,
            elapsed_ms = duration.as_millis() as u64,
            "test case finished"
        );

        TestResult {
            name: self.name.clone(),
            state: self.state,
            actions_run,
            actions_total,
            error,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn failing(name: &str) -> TestAction {
        TestAction::custom(name, |_| Err(Error::Internal("boom".to_string())))
    }

    #[tokio::test]
    async fn test_successful_case() {
        let mut case = TestCase::new("ok")
            .action(TestAction::create_variables([("a", "1")]))
            .action(TestAction::echo("a is ${a}"));
        assert_eq!(case.state(), TestCaseState::Created);

        let result = case.execute(Arc::new(TestContext::new())).await;
        assert!(result.passed());
        assert_eq!(result.actions_run, 2);
        assert_eq!(result.actions_total, 2);
        assert!(result.error.is_none());
        assert_eq!(case.state(), TestCaseState::Success);
    }

    #[tokio::test]
    async fn test_failure_stops_and_runs_finally() {
        let cleaned = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&cleaned);
        let context = Arc::new(TestContext::new());
        let mut case = TestCase::new("fails")
            .action(failing("broken"))
            .action(TestAction::create_variables([("after", "x")]))
            .finally(TestAction::custom("cleanup", move |_| {
                *flag.lock() = true;
                Ok(())
            }));

        let result = case.execute(Arc::clone(&context)).await;
        assert_eq!(result.state, TestCaseState::Failed);
        assert_eq!(result.actions_run, 1);
        assert!(matches!(
            result.error,
            Some(Error::ActionFailed { ref action, .. }) if action == "broken"
        ));
        assert!(*cleaned.lock());
        assert!(!context.has_variable("after"));
    }

    #[tokio::test]
    async fn test_finally_failure_fails_case() {
        let mut case = TestCase::new("cleanup fails")
            .action(TestAction::echo("fine"))
            .finally(failing("cleanup"));
        let result = case.execute(Arc::new(TestContext::new())).await;
        assert!(!result.passed());
        assert!(matches!(
            result.error,
            Some(Error::ActionFailed { ref action, .. }) if action == "cleanup"
        ));
    }

    #[tokio::test]
    async fn test_first_error_wins_over_finally() {
        let mut case = TestCase::new("both fail")
            .action(failing("main"))
            .finally(failing("cleanup"));
        let result = case.execute(Arc::new(TestContext::new())).await;
        assert!(matches!(
            result.error,
            Some(Error::ActionFailed { ref action, .. }) if action == "main"
        ));
    }

    #[tokio::test]
    async fn test_terminal_state_is_not_rerun() {
        let mut case = TestCase::new("once").action(TestAction::echo("hi"));
        assert!(case.execute(Arc::new(TestContext::new())).await.passed());

        let again = case.execute(Arc::new(TestContext::new())).await;
        assert!(!again.passed());
        assert_eq!(again.actions_run, 0);
        assert!(matches!(again.error, Some(Error::Internal(_))));
        assert_eq!(case.state(), TestCaseState::Success);
    }
}
