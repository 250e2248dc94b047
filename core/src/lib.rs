pub mod actions;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod executor;
pub mod journal;
pub mod logger;
pub mod plan;
pub mod preflight;
pub mod progress;
pub mod reporter;
pub mod stage;
pub mod stage_runner;
pub mod step;
pub mod step_runner;
pub mod terminal;

pub use cli::{Cli, Commands, HistoryCommands, TraceLevel};
pub use config::Config;
pub use error::{PipelineError, PlanError, PreflightError, StageError};
pub use executor::{invoke, ExecutionResult, ExternalCommand, InvokeOptions};
pub use journal::{RunEntry, RunJournal, RunStatus, StepRecord};
pub use plan::{PlanContext, Variables};
pub use progress::{ProgressController, ProgressSettings};
pub use reporter::{OutcomeCode, Phase, ReporterSettings, StatusReporter};
pub use stage::Stage;
pub use stage_runner::{PipelineOutcome, StageRunner};
pub use step::{Step, StepFn, StepTarget};
pub use step_runner::{StepOutcome, StepRunner};
pub use terminal::{Terminal, TerminalSink};
