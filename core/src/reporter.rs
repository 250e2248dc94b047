use std::fmt;
use std::time::Duration;

use crate::executor::{wrap_status, STATUS_OK, STATUS_TIMEOUT};
use crate::progress::{ProgressController, ProgressSettings};
use crate::terminal::{self, Terminal};

const INDENT: &str = "    ";

pub const DEFAULT_COLUMN_WIDTH: usize = 60;
pub const DEFAULT_STATUS_SETTLE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prefix,
    Suffix,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeCode {
    /// Success that renders nothing; the row is simply overwritten.
    Ok,
    Done,
    Warning,
    Timeout,
    Error(i32),
}

impl OutcomeCode {
    pub fn from_status(status: i32) -> Self {
        match status {
            STATUS_OK => OutcomeCode::Ok,
            STATUS_TIMEOUT => OutcomeCode::Timeout,
            other => OutcomeCode::Error(other),
        }
    }

    pub fn from_raw(raw: i64) -> Self {
        Self::from_status(wrap_status(raw))
    }

    fn token(&self) -> Option<(String, &'static str)> {
        match self {
            OutcomeCode::Ok => None,
            OutcomeCode::Done => Some(("OK".to_string(), terminal::GREEN)),
            OutcomeCode::Warning => Some(("Warning".to_string(), terminal::YELLOW)),
            OutcomeCode::Timeout => Some(("Timeout".to_string(), terminal::BRIGHT_BLUE)),
            OutcomeCode::Error(code) => Some((format!("Error ({})", code), terminal::RED)),
        }
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token() {
            Some((text, _)) => write!(f, "{}", text),
            None => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReporterSettings {
    pub column_width: usize,
    pub colors: bool,
    pub verbose: bool,
    pub status_settle: Duration,
    pub progress: ProgressSettings,
}

impl Default for ReporterSettings {
    fn default() -> Self {
        Self {
            column_width: DEFAULT_COLUMN_WIDTH,
            colors: false,
            verbose: false,
            status_settle: DEFAULT_STATUS_SETTLE,
            progress: ProgressSettings::default(),
        }
    }
}

impl ReporterSettings {
    #[cfg(test)]
    pub(crate) fn instant() -> Self {
        Self {
            status_settle: Duration::ZERO,
            progress: ProgressSettings {
                tick: Duration::from_millis(20),
                settle: Duration::ZERO,
                ..ProgressSettings::default()
            },
            ..Self::default()
        }
    }
}

/// Renders one aligned status row per step:
///
/// ```text
///     Download archive ................................ OK
/// ```
///
/// The reporter owns the progress indicator and stops it before anything
/// else is written, so spinner glyphs never interleave with status tokens.
pub struct StatusReporter {
    terminal: Terminal,
    progress: ProgressController,
    settings: ReporterSettings,
}

impl StatusReporter {
    pub fn new(terminal: Terminal, mut settings: ReporterSettings) -> Self {
        if settings.verbose {
            settings.progress.enabled = false;
        }
        settings.progress.colors = settings.colors;

        Self {
            progress: ProgressController::new(terminal.clone(), settings.progress),
            terminal,
            settings,
        }
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn is_verbose(&self) -> bool {
        self.settings.verbose
    }

    pub fn progress(&self) -> &ProgressController {
        &self.progress
    }

    pub async fn report(
        &mut self,
        phase: Phase,
        description: Option<&str>,
        commit_newline: bool,
        outcome: OutcomeCode,
    ) {
        let own_line = self.settings.verbose && phase == Phase::Prefix && description.is_some();

        if matches!(phase, Phase::Prefix | Phase::Both) {
            if let Some(description) = description {
                self.render_prefix(phase, description);

                if phase == Phase::Prefix {
                    self.progress.start();
                }
            }
        }

        if matches!(phase, Phase::Suffix | Phase::Both) {
            self.progress.stop().await;

            if let Some((text, color)) = outcome.token() {
                let token = terminal::paint(&text, color, self.settings.colors);
                self.terminal.write_str(&format!(" {}", token));
            }
            self.terminal.flush();

            tokio::time::sleep(self.settings.status_settle).await;
        }

        if commit_newline && !own_line {
            self.terminal.write_str("\n");
            self.terminal.flush();
        }
    }

    /// Stops a spinner left behind by an abandoned step and closes the row.
    pub async fn interrupt(&mut self) {
        self.progress.stop().await;
        self.terminal.write_str("\n");
        self.terminal.flush();
    }

    pub fn line(&self, text: &str) {
        self.terminal.write_str(&format!("{}\n", text));
        self.terminal.flush();
    }

    fn render_prefix(&self, phase: Phase, description: &str) {
        // Child output follows in verbose mode, so the row cannot stay open.
        if self.settings.verbose && phase == Phase::Prefix {
            self.terminal
                .write_str(&format!("\r{}{}{}\n", terminal::CLEAR_LINE, INDENT, description));
            self.terminal.flush();
            return;
        }

        let dots = ".".repeat(
            self.settings
                .column_width
                .saturating_sub(description.chars().count() + 2),
        );

        self.terminal.write_str(&format!(
            "\r{}{}{} {} ",
            terminal::CLEAR_LINE,
            INDENT,
            description,
            dots
        ));
        self.terminal.flush();
    }
}
