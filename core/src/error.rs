use thiserror::Error;

/// Raised at most once per stage: the first step whose effective status
/// was non-zero. Nothing after that step ran.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Stage '{stage}' failed at '{description}' (status {status})")]
pub struct StageError {
    pub stage: String,
    pub description: String,
    pub status: i32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Start stage {index} is out of range: the plan has {count} stage(s)")]
    InvalidStartStage { index: usize, count: usize },

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Interrupted by the operator")]
    Interrupted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Unknown action '{action}' in step '{step}'")]
    UnknownAction { step: String, action: String },

    #[error("Step '{step}' must set exactly one of `program` or `action`")]
    MissingTarget { step: String },

    #[error("Invalid variable '{0}': expected NAME=VALUE")]
    InvalidVariable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    #[error("Insufficient free disk space at {path}: {available_mb} MB available, {required_mb} MB required")]
    InsufficientDiskSpace {
        path: String,
        available_mb: u64,
        required_mb: u64,
    },

    #[error("Required tools are missing: {}", .0.join(", "))]
    MissingTools(Vec<String>),
}
