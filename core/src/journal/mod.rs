pub mod storage;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::stage_runner::PipelineOutcome;
use crate::step_runner::StepOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub description: String,
    pub true_status: i32,
    pub effective_status: i32,
    #[serde(default)]
    pub ignored: bool,
    pub duration: f64,
}

impl From<&StepOutcome> for StepRecord {
    fn from(outcome: &StepOutcome) -> Self {
        Self {
            description: outcome.description.clone(),
            true_status: outcome.true_status,
            effective_status: outcome.effective_status,
            ignored: outcome.ignored,
            duration: outcome.duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    StageFailed,
    Interrupted,
    Aborted,
}

impl RunStatus {
    pub fn success(&self) -> bool {
        *self == RunStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntry {
    pub timestamp: DateTime<Local>,
    pub start_stage: usize,
    pub duration: f64,
    pub status: RunStatus,
    pub failed_stage: Option<String>,
    pub failed_step: Option<String>,
    pub failed_status: Option<i32>,
    #[serde(default)]
    pub note: Option<String>,
    pub steps: Vec<StepRecord>,
}

impl RunEntry {
    pub fn new(start_stage: usize) -> Self {
        Self {
            timestamp: Local::now(),
            start_stage,
            duration: 0.0,
            status: RunStatus::Running,
            failed_stage: None,
            failed_step: None,
            failed_status: None,
            note: None,
            steps: Vec::new(),
        }
    }

    pub fn add_step(&mut self, outcome: &StepOutcome) {
        self.steps.push(StepRecord::from(outcome));
    }

    pub fn finalize(&mut self, outcome: &PipelineOutcome, total_duration: f64) {
        self.duration = total_duration;
        self.status = match outcome {
            PipelineOutcome::Completed => RunStatus::Completed,
            PipelineOutcome::StageFailed(err) => {
                self.failed_stage = Some(err.stage.clone());
                self.failed_step = Some(err.description.clone());
                self.failed_status = Some(err.status);
                RunStatus::StageFailed
            }
            PipelineOutcome::Interrupted => RunStatus::Interrupted,
        };
    }

    /// Closes a run that never reached the pipeline (preflight, plan errors).
    pub fn abort(&mut self, reason: impl Into<String>, total_duration: f64) {
        self.duration = total_duration;
        self.status = RunStatus::Aborted;
        self.note = Some(reason.into());
    }

    pub fn ignored_failures(&self) -> usize {
        self.steps.iter().filter(|s| s.ignored).count()
    }
}

pub struct RunJournal {
    entries: Vec<RunEntry>,
    storage_path: PathBuf,
    max_runs: usize,
}

impl RunJournal {
    pub fn new(storage_path: PathBuf, max_runs: usize) -> anyhow::Result<Self> {
        let entries = storage::load_journal(&storage_path)?;
        Ok(Self {
            entries,
            storage_path,
            max_runs,
        })
    }

    pub fn add_entry(&mut self, entry: RunEntry) -> anyhow::Result<()> {
        self.entries.push(entry);

        if self.entries.len() > self.max_runs {
            let excess = self.entries.len() - self.max_runs;
            self.entries.drain(..excess);
        }

        storage::save_journal(&self.storage_path, &self.entries)
    }

    pub fn entries(&self) -> &[RunEntry] {
        &self.entries
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.clear();
        storage::save_journal(&self.storage_path, &self.entries)
    }
}
