//! Built-in callables a plan can name with `action = "..."` instead of a
//! program.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::executor::{self, ExternalCommand, InvokeOptions, TRANSFER_OK};
use crate::step::{StepFn, StepFuture};
use crate::terminal::Terminal;

pub const ENSURE_DIRECTORIES: &str = "ensure-directories";
pub const DOWNLOAD: &str = "download";
pub const REMOVE_FILE: &str = "remove-file";

pub const ALL: [&str; 3] = [ENSURE_DIRECTORIES, DOWNLOAD, REMOVE_FILE];

#[derive(Clone)]
pub struct ActionContext {
    pub terminal: Terminal,
}

pub fn is_known(name: &str) -> bool {
    ALL.contains(&name)
}

pub fn resolve(name: &str, ctx: &ActionContext) -> Option<StepFn> {
    let func: StepFn = match name {
        ENSURE_DIRECTORIES => Arc::new(|args: Vec<String>, _: Duration| -> StepFuture {
            Box::pin(ensure_directories(args))
        }),
        REMOVE_FILE => Arc::new(|args: Vec<String>, _: Duration| -> StepFuture {
            Box::pin(remove_files(args))
        }),
        DOWNLOAD => {
            let ctx = ctx.clone();
            Arc::new(move |args: Vec<String>, timeout: Duration| -> StepFuture {
                let ctx = ctx.clone();
                Box::pin(async move { download(args, timeout, &ctx).await })
            })
        }
        _ => return None,
    };

    Some(func)
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

pub async fn ensure_directories(paths: Vec<String>) -> anyhow::Result<i32> {
    for path in paths {
        let path = expand(&path);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        debug!(path = %path.display(), "directory ready");
    }

    Ok(0)
}

pub async fn remove_files(paths: Vec<String>) -> anyhow::Result<i32> {
    for path in paths {
        let path = expand(&path);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "file removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to remove file: {}", path.display()));
            }
        }
    }

    Ok(0)
}

/// `download <url> <destination dir> [proxy]`: 0 only when curl exits 0
/// and the server answered 200.
pub async fn download(args: Vec<String>, timeout: Duration, ctx: &ActionContext) -> anyhow::Result<i32> {
    let (url, dir) = match args.as_slice() {
        [url, dir, ..] => (url.as_str(), dir.as_str()),
        _ => anyhow::bail!("{} expects <url> <destination dir> [proxy]", DOWNLOAD),
    };
    let proxy = args.get(2).map(String::as_str);

    let command = download_command(url, dir, proxy)?;
    let options = InvokeOptions {
        suppress_output: true,
        timeout,
    };
    let result = executor::invoke(&command, options, &ctx.terminal).await;

    if result.success() && result.secondary_status == TRANSFER_OK {
        return Ok(0);
    }

    // The status row is still open here; the step runner reports the failure.
    debug!(
        url,
        exit_status = result.primary_status,
        http_status = result.secondary_status,
        "download failed"
    );
    Ok(1)
}

pub fn download_command(url: &str, dir: &str, proxy: Option<&str>) -> anyhow::Result<ExternalCommand> {
    let file_name = file_name_from_url(url)
        .with_context(|| format!("Cannot derive a file name from URL: {}", url))?;
    let destination = expand(dir).join(file_name);

    let mut args: Vec<String> = ["-s", "-S", "-w", "%{http_code}"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if let Some(proxy) = proxy.map(str::trim).filter(|p| !p.is_empty()) {
        args.push("--proxy".to_string());
        args.push(proxy.to_string());
    }

    args.push("--output".to_string());
    args.push(destination.display().to_string());
    args.push(url.to_string());

    Ok(ExternalCommand::new(executor::DUAL_STATUS_PROGRAM, args))
}

fn file_name_from_url(url: &str) -> Option<&str> {
    let base = url.split(['?', '#']).next()?;
    let after_scheme = match base.find("://") {
        Some(index) => &base[index + 3..],
        None => base,
    };
    let (_, path) = after_scheme.split_once('/')?;

    path.rsplit('/').next().filter(|name| !name.is_empty())
}
