use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::executor::{self, InvokeOptions, STATUS_FAILURE, TRANSFER_OK};
use crate::reporter::{OutcomeCode, Phase, StatusReporter};
use crate::step::{Step, StepFn, StepTarget};

/// What happened to one step. `true_status` keeps the real code even when
/// `ignore_errors` forced `effective_status` to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub description: String,
    pub true_status: i32,
    pub effective_status: i32,
    pub ignored: bool,
    pub secondary_status: i32,
    pub lines: Vec<String>,
    pub duration: f64,
}

pub struct StepRunner {
    reporter: StatusReporter,
    commit_newline: bool,
    outcomes: Vec<StepOutcome>,
}

impl StepRunner {
    pub fn new(reporter: StatusReporter, commit_newline: bool) -> Self {
        Self {
            reporter,
            commit_newline,
            outcomes: Vec::new(),
        }
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut StatusReporter {
        &mut self.reporter
    }

    pub fn commit_newline(&self) -> bool {
        self.commit_newline
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn take_outcomes(&mut self) -> Vec<StepOutcome> {
        std::mem::take(&mut self.outcomes)
    }

    /// Runs one step end to end and returns its effective status. Never
    /// fails: every failure mode of the target ends up in the status.
    ///
    /// Diagnostics are emitted only after the suffix, once the spinner has
    /// stopped, so log lines never land inside an open row.
    pub async fn run_step(&mut self, step: Step) -> i32 {
        let started = Instant::now();

        self.reporter
            .report(Phase::Prefix, Some(&step.description), false, OutcomeCode::Ok)
            .await;

        let mut callable_error = None;
        let mut timed_out = false;

        let (true_status, secondary_status, lines) = match (&step.target, step.command()) {
            (StepTarget::Callable { func, .. }, _) => {
                let (status, error) = run_callable(func, step.arguments.clone(), step.timeout).await;
                callable_error = error;
                (status, 0, Vec::new())
            }
            (StepTarget::Program(_), Some(command)) => {
                let options = InvokeOptions {
                    suppress_output: !self.reporter.is_verbose(),
                    timeout: step.timeout,
                };
                let result = executor::invoke(&command, options, self.reporter.terminal()).await;
                timed_out = result.timed_out();

                let status = if command.is_dual_status()
                    && result.secondary_status != 0
                    && result.secondary_status != TRANSFER_OK
                {
                    result.secondary_status
                } else {
                    result.primary_status
                };

                (status, result.secondary_status, result.lines)
            }
            (StepTarget::Program(_), None) => (STATUS_FAILURE, 0, Vec::new()),
        };

        let effective_status = if step.ignore_errors { 0 } else { true_status };

        self.reporter
            .report(
                Phase::Suffix,
                None,
                self.commit_newline,
                OutcomeCode::from_status(effective_status),
            )
            .await;

        if let (StepTarget::Callable { name, .. }, Some(err)) = (&step.target, &callable_error) {
            error!(step = %step.description, action = %name, error = %err, "step action failed");
        }
        if timed_out {
            warn!(step = %step.description, timeout_secs = step.timeout.as_secs_f64(), "step timed out");
        }
        if step.ignore_errors && true_status != 0 {
            warn!(step = %step.description, true_status, "ignoring step failure");
        }

        info!(
            step = %step.description,
            true_status,
            effective_status,
            secondary_status,
            "step finished"
        );

        self.outcomes.push(StepOutcome {
            description: step.description,
            true_status,
            effective_status,
            ignored: step.ignore_errors && true_status != 0,
            secondary_status,
            lines,
            duration: started.elapsed().as_secs_f64(),
        });

        effective_status
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_callable(func: &StepFn, args: Vec<String>, timeout: Duration) -> (i32, Option<String>) {
    let func = func.clone();

    // A separate task turns a panic inside the callable into a JoinError.
    let mut task = AbortOnDrop(tokio::spawn(async move { func(args, timeout).await }));

    match (&mut task.0).await {
        Ok(Ok(status)) => (status, None),
        Ok(Err(err)) => (STATUS_FAILURE, Some(format!("{:#}", err))),
        Err(err) => (STATUS_FAILURE, Some(err.to_string())),
    }
}
