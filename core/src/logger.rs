use std::io::Write;

use anyhow::Result;
use tracing_subscriber::fmt;

use crate::cli::TraceLevel;

pub const LOG_ENV: &str = "STAGEHAND_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    fn color(self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[90m",
            LogLevel::Info => "\x1b[37m",
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[31;1m",
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, LogLevel::Warning | LogLevel::Error | LogLevel::Fatal)
    }
}

pub struct Logger {
    use_colors: bool,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    pub fn format(&self, level: LogLevel, message: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", level.color(), message)
        } else {
            message.to_string()
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let line = self.format(level, message);

        if level.to_stderr() {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        } else {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the global `tracing` subscriber on stderr.
///
/// Level priority: `--log-level`, then `STAGEHAND_LOG`, then `warn`, so
/// diagnostics stay out of the status rows unless asked for.
pub fn init_tracing(cli_level: Option<TraceLevel>) -> Result<()> {
    let level = match cli_level {
        Some(lvl) => level_from_trace_level(lvl),
        None => std::env::var(LOG_ENV)
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::WARN),
    };

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;

    Ok(())
}

fn level_from_trace_level(lvl: TraceLevel) -> tracing::Level {
    match lvl {
        TraceLevel::Error => tracing::Level::ERROR,
        TraceLevel::Warn => tracing::Level::WARN,
        TraceLevel::Info => tracing::Level::INFO,
        TraceLevel::Debug => tracing::Level::DEBUG,
        TraceLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_str() {
        assert_eq!(parse_level_str(" Debug "), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level_str("warning"), Some(tracing::Level::WARN));
        assert_eq!(parse_level_str("loud"), None);
    }

    #[test]
    fn test_format_respects_colors() {
        assert_eq!(Logger::with_colors(false).format(LogLevel::Error, "boom"), "boom");
        assert_eq!(
            Logger::with_colors(true).format(LogLevel::Warning, "careful"),
            "\x1b[33mcareful\x1b[0m"
        );
    }

    #[test]
    fn test_cli_level_maps_directly() {
        assert_eq!(level_from_trace_level(TraceLevel::Trace), tracing::Level::TRACE);
        assert_eq!(level_from_trace_level(TraceLevel::Error), tracing::Level::ERROR);
    }
}
