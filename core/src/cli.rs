use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(author, version, about = "Run staged provisioning pipelines with live status rows", long_about = None)]
pub struct Cli {
    #[arg(
        short = 'C',
        long = "directory",
        value_name = "DIR",
        help = "Project directory containing stagehand.toml"
    )]
    pub source_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 't',
        long = "start-stage",
        value_name = "INDEX",
        default_value_t = 0,
        help = "Index of the first stage to run"
    )]
    pub start_stage: usize,

    #[arg(short = 'v', long, help = "Print step output and stage headers")]
    pub verbose: bool,

    #[arg(long, value_enum, help = "Diagnostic log level (overrides STAGEHAND_LOG)")]
    pub log_level: Option<TraceLevel>,

    #[arg(
        long = "var",
        value_name = "NAME=VALUE",
        help = "Override a pipeline variable (repeatable)"
    )]
    pub vars: Vec<String>,

    #[arg(long, value_name = "URL", help = "Proxy server to probe and hand to downloads")]
    pub proxy: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    #[command(about = "Show recorded runs")]
    Show {
        #[arg(short, long, help = "Number of entries to show")]
        count: Option<usize>,
    },

    #[command(about = "Clear recorded runs")]
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Run the pipeline (default)")]
    Run,

    #[command(about = "List stages and steps without running them")]
    List,

    #[command(about = "Write a starter stagehand.toml")]
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },

    #[command(about = "Manage the run journal")]
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

impl Cli {
    pub fn source_directory(&self) -> PathBuf {
        self.source_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::parse_from(["stagehand"]);

        assert!(cli.command.is_none());
        assert_eq!(cli.start_stage, 0);
        assert!(!cli.verbose);
        assert!(cli.vars.is_empty());
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "stagehand",
            "-t",
            "2",
            "-v",
            "--var",
            "instance=sdk",
            "--var",
            "user=dev",
            "--proxy",
            "http://proxy:911",
            "--log-level",
            "debug",
        ]);

        assert_eq!(cli.start_stage, 2);
        assert!(cli.verbose);
        assert_eq!(cli.vars, vec!["instance=sdk", "user=dev"]);
        assert_eq!(cli.proxy.as_deref(), Some("http://proxy:911"));
        assert_eq!(cli.log_level, Some(TraceLevel::Debug));
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::parse_from(["stagehand", "history", "show", "-c", "3"]);
        assert!(matches!(
            cli.command,
            Some(Commands::History {
                command: HistoryCommands::Show { count: Some(3) }
            })
        ));

        let cli = Cli::parse_from(["stagehand", "init", "--force"]);
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
    }
}
