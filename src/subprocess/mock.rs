use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::context::RunContext;
use super::error::ProcessError;
use super::runner::{ProcessCommand, ProcessRunner};

/// Records every command it is asked to run and succeeds unless an
/// expectation says otherwise.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct MockExpectation {
    program: String,
    #[allow(clippy::type_complexity)]
    args_matcher: Option<Box<dyn Fn(&[String]) -> bool + Send + Sync>>,
    response: MockResponse,
    times_called: usize,
    expected_times: Option<usize>,
}

#[derive(Clone)]
enum MockResponse {
    Success,
    ExitCode(i32),
    Failure(String),
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_command(&self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                program: program.to_string(),
                args_matcher: None,
                response: MockResponse::Success,
                times_called: 0,
                expected_times: None,
            },
        }
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        let history = lock(&self.call_history);
        let count = history.iter().filter(|cmd| cmd.program == program).count();
        count == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        lock(&self.call_history).clone()
    }

    /// Command lines in call order, e.g. `helm upgrade --install foo chart`.
    pub fn command_lines(&self) -> Vec<String> {
        lock(&self.call_history)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn reset(&self) {
        lock(&self.expectations).clear();
        lock(&self.call_history).clear();
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, ctx: &RunContext, command: &ProcessCommand) -> Result<(), ProcessError> {
        ctx.check()?;
        lock(&self.call_history).push(command.clone());

        let mut expectations = lock(&self.expectations);
        let matched = expectations.iter_mut().find(|expectation| {
            expectation.program == command.program
                && expectation
                    .expected_times
                    .map_or(true, |limit| expectation.times_called < limit)
                && expectation
                    .args_matcher
                    .as_ref()
                    .map_or(true, |matcher| matcher(&command.args))
        });

        let Some(expectation) = matched else {
            return Ok(());
        };
        expectation.times_called += 1;

        match &expectation.response {
            MockResponse::Success => Ok(()),
            MockResponse::ExitCode(code) => Err(ProcessError::ExitCode(*code)),
            MockResponse::Failure(message) => Err(ProcessError::Mock(message.clone())),
        }
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args_matcher = Some(Box::new(matcher));
        self
    }

    /// Match only when the first argument equals `subcommand`.
    pub fn with_subcommand(self, subcommand: &str) -> Self {
        let subcommand = subcommand.to_string();
        self.with_args(move |args| args.first() == Some(&subcommand))
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response = if code == 0 {
            MockResponse::Success
        } else {
            MockResponse::ExitCode(code)
        };
        self
    }

    pub fn returns_success(mut self) -> Self {
        self.expectation.response = MockResponse::Success;
        self
    }

    /// Fail with an error whose message is exactly `message`.
    pub fn fails_with(mut self, message: &str) -> Self {
        self.expectation.response = MockResponse::Failure(message.to_string());
        self
    }

    /// Apply this response to the first `n` matching calls only.
    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        lock(&self.runner.expectations).push(self.expectation);
    }
}
