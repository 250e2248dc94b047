use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{cursor, execute};
use stagehand_core::actions::{self, ActionContext};
use stagehand_core::cli::{Commands, HistoryCommands};
use stagehand_core::config::CONFIG_FILE_NAME;
use stagehand_core::logger::{self, LogLevel, Logger};
use stagehand_core::plan::{self, PlanContext};
use stagehand_core::{
    preflight, terminal, Cli, Config, PipelineError, PipelineOutcome, RunEntry, RunJournal,
    StageRunner, StatusReporter, StepRunner,
};

/// Hides the cursor for the lifetime of the guard. Restores it on drop so
/// early returns and errors leave the terminal usable.
struct CursorGuard {
    hidden: bool,
}

impl CursorGuard {
    fn hide(enabled: bool) -> Self {
        let hidden = enabled && execute!(std::io::stdout(), cursor::Hide).is_ok();
        Self { hidden }
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        if self.hidden {
            let _ = execute!(std::io::stdout(), cursor::Show);
        }
    }
}

fn open_journal(config: &Config) -> Option<RunJournal> {
    match RunJournal::new(config.journal_path(), config.journal.max_runs) {
        Ok(journal) => Some(journal),
        Err(err) => {
            tracing::warn!(error = %err, "run journal unavailable");
            None
        }
    }
}

fn record_run(journal: Option<RunJournal>, entry: RunEntry) {
    if let Some(mut journal) = journal {
        if let Err(err) = journal.add_entry(entry) {
            tracing::warn!(error = %err, "failed to record run");
        }
    }
}

async fn wait_for_interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("cannot listen for Ctrl+C; interrupts are disabled");
        std::future::pending::<()>().await;
    }
}

async fn run_pipeline(cli: &Cli, config: Config, logger: &Logger) -> Result<ExitCode> {
    if config.stages.is_empty() {
        anyhow::bail!(
            "No stages configured in {}. Run 'stagehand init' to create one.",
            cli.source_directory().join(CONFIG_FILE_NAME).display()
        );
    }

    let overrides = cli
        .vars
        .iter()
        .map(|raw| plan::parse_var(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let verbose = cli.verbose || !config.execution.hidden;
    let is_tty = terminal::stdout_is_tty();
    let out = terminal::stdout();

    let mut reporter = StatusReporter::new(
        out.clone(),
        config.display.reporter_settings(verbose, is_tty),
    );

    let journal = open_journal(&config);
    let mut entry = RunEntry::new(cli.start_stage);
    let started = Instant::now();

    let _cursor = CursorGuard::hide(is_tty);

    // One listener for the whole run, registered on the first poll below.
    let mut interrupt = Box::pin(wait_for_interrupt());

    let report = match preflight::run_interruptible(&config, &mut reporter, &mut interrupt).await {
        Ok(Some(report)) => report,
        Ok(None) => {
            entry.finalize(&PipelineOutcome::Interrupted, started.elapsed().as_secs_f64());
            record_run(journal, entry);
            logger.log(
                LogLevel::Warning,
                "Operation interrupted by the user, exiting...",
            );
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => {
            entry.abort(err.to_string(), started.elapsed().as_secs_f64());
            record_run(journal, entry);
            logger.log(LogLevel::Error, &format!("Error: {}", err));
            return Ok(ExitCode::FAILURE);
        }
    };

    let ctx = PlanContext {
        vars: plan::variables(&config, &overrides, report.proxy_available),
        proxy_available: report.proxy_available,
        default_timeout: config.default_timeout(),
        actions: ActionContext {
            terminal: out.clone(),
        },
    };
    let stages = plan::build(&config, &ctx)?;

    let commit_newline = verbose || config.display.scrolling;
    let mut runner = StageRunner::new(StepRunner::new(reporter, commit_newline));

    let result = runner
        .run_pipeline(stages, cli.start_stage, &mut interrupt)
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            entry.abort(err.to_string(), started.elapsed().as_secs_f64());
            record_run(journal, entry);
            logger.log(LogLevel::Error, &format!("Error: {}", err));
            return Ok(ExitCode::FAILURE);
        }
    };

    for step in runner.step_runner().outcomes() {
        entry.add_step(step);
    }
    entry.finalize(&outcome, started.elapsed().as_secs_f64());
    record_run(journal, entry);

    match outcome.into_result() {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(PipelineError::Interrupted) => {
            logger.log(
                LogLevel::Warning,
                "Operation interrupted by the user, exiting...",
            );
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            logger.log(LogLevel::Error, &format!("Error: {}", err));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn list_stages(cli: &Cli, config: &Config, logger: &Logger) -> Result<()> {
    if config.stages.is_empty() {
        logger.log(LogLevel::Info, "No stages configured.");
        return Ok(());
    }

    let overrides = cli
        .vars
        .iter()
        .map(|raw| plan::parse_var(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let vars = plan::variables(config, &overrides, false);

    for (index, stage) in config.stages.iter().enumerate() {
        logger.log(
            LogLevel::Info,
            &format!(
                "[{}] {} ({} steps)",
                index,
                plan::expand(&stage.name, &vars),
                stage.steps.len()
            ),
        );

        for step in &stage.steps {
            let target = match (&step.program, &step.action) {
                (Some(program), None) => {
                    let mut line = plan::expand(program, &vars);
                    for arg in &step.args {
                        line.push(' ');
                        line.push_str(&plan::expand(arg, &vars));
                    }
                    line
                }
                (None, Some(action)) if actions::is_known(action) => format!("<{}>", action),
                (None, Some(action)) => format!("<{}> (unknown action)", action),
                _ => "(no program or action)".to_string(),
            };

            let mut flags = Vec::new();
            if step.ignore_errors {
                flags.push("ignore errors".to_string());
            }
            match step.when_proxy {
                Some(true) => flags.push("proxy only".to_string()),
                Some(false) => flags.push("without proxy only".to_string()),
                None => {}
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };

            logger.log(
                LogLevel::Info,
                &format!(
                    "    - {}: {}{}",
                    plan::expand(&step.description, &vars),
                    target,
                    flags
                ),
            );
        }
    }

    Ok(())
}

fn show_history(config: &Config, count: Option<usize>, logger: &Logger) -> Result<()> {
    let journal = RunJournal::new(config.journal_path(), config.journal.max_runs)
        .context("Failed to load run journal")?;

    let entries = journal.entries();
    if entries.is_empty() {
        logger.log(LogLevel::Info, "No recorded runs.");
        return Ok(());
    }

    let count = count.unwrap_or(10).min(entries.len());
    logger.log(LogLevel::Info, &format!("Run history (last {} entries):", count));
    logger.log(LogLevel::Info, "");

    for entry in entries.iter().rev().take(count) {
        let mark = if entry.status.success() { "✓" } else { "✗" };
        let mut line = format!(
            "{} {} | from stage {} | {:?} | {:.1}s | {} steps, {} ignored",
            mark,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.start_stage,
            entry.status,
            entry.duration,
            entry.steps.len(),
            entry.ignored_failures()
        );

        if let (Some(step), Some(status)) = (&entry.failed_step, entry.failed_status) {
            line.push_str(&format!(" | failed at '{}' (status {})", step, status));
        }
        if let Some(note) = &entry.note {
            line.push_str(&format!(" | {}", note));
        }

        let level = if entry.status.success() {
            LogLevel::Info
        } else {
            LogLevel::Warning
        };
        logger.log(level, &line);
    }

    Ok(())
}

fn clear_history(config: &Config, logger: &Logger) -> Result<()> {
    let mut journal = RunJournal::new(config.journal_path(), config.journal.max_runs)
        .context("Failed to load run journal")?;
    journal.clear()?;
    logger.log(LogLevel::Info, "Run history cleared.");
    Ok(())
}

fn init_config(cli: &Cli, force: bool, logger: &Logger) -> Result<()> {
    let config_path = cli.source_directory().join(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists at {}. Use --force to overwrite it.",
            CONFIG_FILE_NAME,
            config_path.display()
        );
    }

    Config::starter()
        .save_to_file(&config_path)
        .with_context(|| format!("Failed to save {}", CONFIG_FILE_NAME))?;

    logger.log(
        LogLevel::Info,
        &format!("Created {} at {}", CONFIG_FILE_NAME, config_path.display()),
    );

    Ok(())
}

async fn dispatch(cli: &Cli, logger: &Logger) -> Result<ExitCode> {
    if let Some(Commands::Init { force }) = &cli.command {
        init_config(cli, *force, logger)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(&cli.source_directory(), cli.config.as_deref())?;
    if let Some(proxy) = &cli.proxy {
        config.proxy.server = Some(proxy.clone());
    }

    match &cli.command {
        Some(Commands::List) => {
            list_stages(cli, &config, logger)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::History { command }) => {
            match command {
                HistoryCommands::Show { count } => show_history(&config, *count, logger)?,
                HistoryCommands::Clear => clear_history(&config, logger)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run) | None => {
            let logger = Logger::with_colors(config.display.colors.enabled(terminal::stdout_is_tty()));
            run_pipeline(cli, config, &logger).await
        }
        Some(Commands::Init { .. }) => Ok(ExitCode::SUCCESS),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logger::init_tracing(cli.log_level) {
        eprintln!("{:#}", err);
    }

    let logger = Logger::new();

    match dispatch(&cli, &logger).await {
        Ok(code) => code,
        Err(err) => {
            logger.log(LogLevel::Error, &format!("Exception: {:#}", err));
            ExitCode::FAILURE
        }
    }
}
