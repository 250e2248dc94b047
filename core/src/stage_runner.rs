use std::future::Future;

use tracing::{info, warn};

use crate::error::{PipelineError, StageError};
use crate::reporter::{OutcomeCode, Phase};
use crate::stage::Stage;
use crate::step_runner::StepRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    StageFailed(StageError),
    Interrupted,
}

impl PipelineOutcome {
    pub fn into_result(self) -> Result<(), PipelineError> {
        match self {
            PipelineOutcome::Completed => Ok(()),
            PipelineOutcome::StageFailed(err) => Err(PipelineError::Stage(err)),
            PipelineOutcome::Interrupted => Err(PipelineError::Interrupted),
        }
    }
}

pub struct StageRunner {
    steps: StepRunner,
}

impl StageRunner {
    pub fn new(steps: StepRunner) -> Self {
        Self { steps }
    }

    pub fn step_runner(&self) -> &StepRunner {
        &self.steps
    }

    pub fn step_runner_mut(&mut self) -> &mut StepRunner {
        &mut self.steps
    }

    pub fn into_step_runner(self) -> StepRunner {
        self.steps
    }

    /// Runs the steps of `stage` in order and stops at the first non-zero
    /// effective status. A completed stage gets a committed `OK` banner.
    pub async fn run_stage(&mut self, stage: Stage) -> Result<(), StageError> {
        let banner = stage.banner_text();
        let Stage { name, steps, .. } = stage;

        for step in steps {
            let description = step.description.clone();
            let status = self.steps.run_step(step).await;

            if status != 0 {
                warn!(stage = %name, step = %description, status, "stage aborted");
                return Err(StageError {
                    stage: name,
                    description,
                    status,
                });
            }
        }

        self.steps
            .reporter_mut()
            .report(Phase::Both, Some(&banner), true, OutcomeCode::Done)
            .await;

        info!(stage = %name, "stage completed");
        Ok(())
    }

    /// Runs `stages[start_stage..]` in order, racing the whole run against
    /// `interrupt`. Earlier stages are skipped entirely. Nothing is rolled
    /// back on failure or interrupt.
    pub async fn run_pipeline<F>(
        &mut self,
        stages: Vec<Stage>,
        start_stage: usize,
        interrupt: F,
    ) -> Result<PipelineOutcome, PipelineError>
    where
        F: Future<Output = ()>,
    {
        if start_stage >= stages.len() {
            return Err(PipelineError::InvalidStartStage {
                index: start_stage,
                count: stages.len(),
            });
        }

        let verbose = self.steps.reporter().is_verbose();

        let run = async {
            for (index, stage) in stages.into_iter().enumerate().skip(start_stage) {
                if verbose {
                    self.steps
                        .reporter()
                        .line(&format!("\nStarting stage {}: {}\n", index, stage.name));
                }

                info!(stage = %stage.name, index, "starting stage");
                self.run_stage(stage).await?;
            }

            Ok::<(), StageError>(())
        };

        let outcome = tokio::select! {
            result = run => match result {
                Ok(()) => PipelineOutcome::Completed,
                Err(err) => PipelineOutcome::StageFailed(err),
            },
            _ = interrupt => PipelineOutcome::Interrupted,
        };

        if outcome == PipelineOutcome::Interrupted {
            warn!("pipeline interrupted");
            self.steps.reporter_mut().interrupt().await;
        }

        Ok(outcome)
    }
}
