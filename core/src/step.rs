use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::executor::{ExternalCommand, DEFAULT_TIMEOUT};

pub type StepFuture = Pin<Box<dyn Future<Output = anyhow::Result<i32>> + Send>>;

/// A local unit of work. Receives the step arguments and the step timeout
/// and resolves to a status code; an `Err` counts as status 1.
pub type StepFn = Arc<dyn Fn(Vec<String>, Duration) -> StepFuture + Send + Sync>;

#[derive(Clone)]
pub enum StepTarget {
    Program(String),
    Callable { name: String, func: StepFn },
}

impl fmt::Debug for StepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTarget::Program(program) => f.debug_tuple("Program").field(program).finish(),
            StepTarget::Callable { name, .. } => f.debug_tuple("Callable").field(name).finish(),
        }
    }
}

impl fmt::Display for StepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTarget::Program(program) => write!(f, "{}", program),
            StepTarget::Callable { name, .. } => write!(f, "<{}>", name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub description: String,
    pub target: StepTarget,
    pub arguments: Vec<String>,
    pub ignore_errors: bool,
    pub timeout: Duration,
}

impl Step {
    pub fn program(
        description: impl Into<String>,
        program: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        Self {
            description: description.into(),
            target: StepTarget::Program(program.into()),
            arguments,
            ignore_errors: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn callable<F, Fut>(
        description: impl Into<String>,
        name: impl Into<String>,
        arguments: Vec<String>,
        func: F,
    ) -> Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<i32>> + Send + 'static,
    {
        let func: StepFn =
            Arc::new(move |args: Vec<String>, _timeout: Duration| -> StepFuture { Box::pin(func(args)) });
        Self::from_fn(description, name, arguments, func)
    }

    pub fn from_fn(
        description: impl Into<String>,
        name: impl Into<String>,
        arguments: Vec<String>,
        func: StepFn,
    ) -> Self {
        Self {
            description: description.into(),
            target: StepTarget::Callable {
                name: name.into(),
                func,
            },
            arguments,
            ignore_errors: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> Option<ExternalCommand> {
        match &self.target {
            StepTarget::Program(program) => {
                Some(ExternalCommand::new(program.clone(), self.arguments.clone()))
            }
            StepTarget::Callable { .. } => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.description, self.target)?;
        for arg in &self.arguments {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}
