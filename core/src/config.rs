use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::progress::ProgressSettings;
use crate::reporter::ReporterSettings;

pub const CONFIG_FILE_NAME: &str = "stagehand.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub preflight: PreflightConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub fn enabled(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_column_width")]
    pub column_width: usize,
    #[serde(default)]
    pub colors: ColorMode,
    #[serde(default = "default_spinner_tick_ms")]
    pub spinner_tick_ms: u64,
    #[serde(default = "default_spinner_settle_ms")]
    pub spinner_settle_ms: u64,
    #[serde(default = "default_status_settle_ms")]
    pub status_settle_ms: u64,
    #[serde(default)]
    pub scrolling: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightConfig {
    #[serde(default = "default_min_free_space_mb")]
    pub min_free_space_mb: u64,
    #[serde(default = "default_required_tools")]
    pub required_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_journal_path")]
    pub storage_path: String,
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub ignore_errors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_proxy: Option<bool>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            hidden: true,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            column_width: default_column_width(),
            colors: ColorMode::Auto,
            spinner_tick_ms: default_spinner_tick_ms(),
            spinner_settle_ms: default_spinner_settle_ms(),
            status_settle_ms: default_status_settle_ms(),
            scrolling: false,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server: None,
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            min_free_space_mb: default_min_free_space_mb(),
            required_tools: default_required_tools(),
            disk_path: None,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            storage_path: default_journal_path(),
            max_runs: default_max_runs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_column_width() -> usize {
    60
}

fn default_spinner_tick_ms() -> u64 {
    100
}

fn default_spinner_settle_ms() -> u64 {
    100
}

fn default_status_settle_ms() -> u64 {
    300
}

fn default_probe_url() -> String {
    "https://www.google.com".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_min_free_space_mb() -> u64 {
    10 * 1024
}

fn default_required_tools() -> Vec<String> {
    vec!["curl".to_string()]
}

fn default_journal_path() -> String {
    "~/.cache/stagehand/runs.json".to_string()
}

fn default_max_runs() -> usize {
    20
}

impl DisplayConfig {
    pub fn reporter_settings(&self, verbose: bool, is_tty: bool) -> ReporterSettings {
        let colors = self.colors.enabled(is_tty);

        ReporterSettings {
            column_width: self.column_width,
            colors,
            verbose,
            status_settle: Duration::from_millis(self.status_settle_ms),
            progress: ProgressSettings {
                enabled: !verbose,
                colors,
                tick: Duration::from_millis(self.spinner_tick_ms),
                settle: Duration::from_millis(self.spinner_settle_ms),
            },
        }
    }
}

impl Config {
    /// Loads `explicit`, or `stagehand.toml` inside `dir`, and merges the
    /// global file under it. A missing project file yields defaults; a
    /// missing explicit file is an error.
    pub fn load(dir: &Path, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => {
                let expanded = Self::expand_path(&path.to_string_lossy());
                if !expanded.exists() {
                    anyhow::bail!("Config file not found: {}", expanded.display());
                }
                expanded
            }
            None => dir.join(CONFIG_FILE_NAME),
        };

        let project = Config::load_from_file(&path)?;
        let global = Config::load_from_file(Config::global_path()).unwrap_or_default();

        Ok(project.merge_with(global))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = Self::expand_path(&path.as_ref().to_string_lossy());

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Fills gaps in `self` from the global config. Project values win;
    /// stages only ever come from the project file.
    pub fn merge_with(mut self, other: Config) -> Self {
        for (key, value) in other.vars {
            self.vars.entry(key).or_insert(value);
        }
        if self.proxy.server.is_none() {
            self.proxy.server = other.proxy.server;
        }
        self
    }

    pub fn global_path() -> PathBuf {
        Self::expand_path("~/.config/stagehand/stagehand.toml")
    }

    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        PathBuf::from(expanded.as_ref())
    }

    pub fn journal_path(&self) -> PathBuf {
        Self::expand_path(&self.journal.storage_path)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.default_timeout_secs)
    }

    pub fn starter() -> Self {
        let mut config = Config::default();

        config
            .vars
            .insert("workdir".to_string(), "~/stagehand".to_string());

        config.stages = vec![
            StageConfig {
                name: "Prerequisites".to_string(),
                banner: Some("Prerequisites satisfied".to_string()),
                timeout_secs: None,
                steps: vec![StepConfig {
                    description: "Creating working directories".to_string(),
                    action: Some("ensure-directories".to_string()),
                    args: vec!["${workdir}/images".to_string()],
                    ..StepConfig::default()
                }],
            },
            StageConfig {
                name: "Host check".to_string(),
                banner: None,
                timeout_secs: Some(120),
                steps: vec![StepConfig {
                    description: "Reading host information".to_string(),
                    program: Some("uname".to_string()),
                    args: vec!["-a".to_string()],
                    ignore_errors: true,
                    ..StepConfig::default()
                }],
            },
        ];

        config
    }
}
