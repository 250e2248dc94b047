use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::Disks;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::PreflightError;
use crate::executor::{self, ExternalCommand, InvokeOptions, STATUS_NOT_FOUND, TRANSFER_OK};
use crate::reporter::{OutcomeCode, Phase, StatusReporter};
use crate::terminal::Terminal;

const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
const NULL_DEVICE: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreflightReport {
    pub proxy_available: bool,
}

/// Runs the host checks in order: proxy probe (soft), free disk space and
/// required tools (both fatal). Each finding gets a committed banner row.
pub async fn run(
    config: &Config,
    reporter: &mut StatusReporter,
) -> Result<PreflightReport, PreflightError> {
    let terminal = reporter.terminal().clone();

    let proxy_available = match config.proxy.server.as_deref() {
        Some(server) if !server.trim().is_empty() => {
            let timeout = Duration::from_secs(config.proxy.probe_timeout_secs);
            let reachable = probe_proxy(server, &config.proxy.probe_url, timeout, &terminal).await;
            if !reachable {
                reporter
                    .report(Phase::Both, Some("Proxy is not available"), true, OutcomeCode::Warning)
                    .await;
            }
            reachable
        }
        _ => false,
    };

    let required_mb = config.preflight.min_free_space_mb;
    if required_mb > 0 {
        let path = disk_path(config);
        match free_space_mb(&path) {
            Some(available_mb) if available_mb < required_mb => {
                reporter
                    .report(
                        Phase::Both,
                        Some("Insufficient free disk space"),
                        true,
                        OutcomeCode::Error(1),
                    )
                    .await;
                return Err(PreflightError::InsufficientDiskSpace {
                    path: path.display().to_string(),
                    available_mb,
                    required_mb,
                });
            }
            Some(available_mb) => {
                debug!(path = %path.display(), available_mb, required_mb, "disk space ok")
            }
            None => warn!(path = %path.display(), "could not determine free disk space"),
        }
    }

    let missing = missing_tools(&config.preflight.required_tools, &terminal).await;
    if !missing.is_empty() {
        reporter
            .report(
                Phase::Both,
                Some("Basic system utilities are missing"),
                true,
                OutcomeCode::Error(STATUS_NOT_FOUND),
            )
            .await;
        return Err(PreflightError::MissingTools(missing));
    }

    info!(proxy_available, "preflight checks passed");
    Ok(PreflightReport { proxy_available })
}

/// `run`, abandoned as soon as `interrupt` resolves. `Ok(None)` means the
/// checks were interrupted; any in-flight child is killed on drop.
pub async fn run_interruptible<F>(
    config: &Config,
    reporter: &mut StatusReporter,
    interrupt: F,
) -> Result<Option<PreflightReport>, PreflightError>
where
    F: Future<Output = ()>,
{
    let outcome = tokio::select! {
        result = run(config, reporter) => Some(result),
        _ = interrupt => None,
    };

    match outcome {
        Some(result) => result.map(Some),
        None => {
            warn!("preflight interrupted");
            reporter.interrupt().await;
            Ok(None)
        }
    }
}

/// Fetches `probe_url` through `server`; reachable means curl exited 0 and
/// the answer was HTTP 200.
pub async fn probe_proxy(server: &str, probe_url: &str, timeout: Duration, terminal: &Terminal) -> bool {
    let args = [
        "-s",
        "-S",
        "-w",
        "%{http_code}",
        "--proxy",
        server,
        "--output",
        NULL_DEVICE,
        probe_url,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let command = ExternalCommand::new(executor::DUAL_STATUS_PROGRAM, args);
    let options = InvokeOptions {
        suppress_output: true,
        timeout,
    };
    let result = executor::invoke(&command, options, terminal).await;

    debug!(
        server,
        exit_status = result.primary_status,
        http_status = result.secondary_status,
        "proxy probe finished"
    );

    result.primary_status == 0 && result.secondary_status == TRANSFER_OK
}

/// Tools that cannot be spawned at all. Any exit status other than 127
/// (including a failing `--version`) counts as present.
pub async fn missing_tools(tools: &[String], terminal: &Terminal) -> Vec<String> {
    let mut missing = Vec::new();
    let options = InvokeOptions {
        suppress_output: true,
        timeout: TOOL_CHECK_TIMEOUT,
    };

    for tool in tools {
        let command = ExternalCommand::new(tool.clone(), vec!["--version".to_string()]);
        let result = executor::invoke(&command, options, terminal).await;

        if result.primary_status == STATUS_NOT_FOUND {
            warn!(tool = %tool, "required tool not found");
            missing.push(tool.clone());
        }
    }

    missing
}

fn disk_path(config: &Config) -> PathBuf {
    let raw = config.preflight.disk_path.as_deref().unwrap_or("~");
    Config::expand_path(raw)
}

pub fn free_space_mb(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<(PathBuf, u64)> = disks
        .list()
        .iter()
        .map(|disk| (disk.mount_point().to_path_buf(), disk.available_space()))
        .collect();

    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    best_mount(&path, &mounts).map(|bytes| bytes / (1024 * 1024))
}

fn best_mount(path: &Path, mounts: &[(PathBuf, u64)]) -> Option<u64> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, available)| *available)
}
