use std::fmt;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::decoder;
use crate::terminal::Terminal;

pub const STATUS_OK: i32 = 0;
pub const STATUS_FAILURE: i32 = 1;
pub const STATUS_TIMEOUT: i32 = 124;
pub const STATUS_NOT_EXECUTABLE: i32 = 126;
pub const STATUS_NOT_FOUND: i32 = 127;

pub const DUAL_STATUS_PROGRAM: &str = "curl";
pub const TRANSFER_OK: i32 = 200;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn is_dual_status(&self) -> bool {
        is_dual_status_program(&self.program)
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

pub fn is_dual_status_program(program: &str) -> bool {
    Path::new(program)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.eq_ignore_ascii_case(DUAL_STATUS_PROGRAM))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy)]
pub struct InvokeOptions {
    pub suppress_output: bool,
    pub timeout: Duration,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            suppress_output: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub primary_status: i32,
    pub secondary_status: i32,
    pub lines: Vec<String>,
    pub duration: f64,
}

impl ExecutionResult {
    fn failed(status: i32, start: Instant) -> Self {
        Self {
            primary_status: status,
            secondary_status: 0,
            lines: Vec::new(),
            duration: start.elapsed().as_secs_f64(),
        }
    }

    pub fn success(&self) -> bool {
        self.primary_status == STATUS_OK
    }

    pub fn timed_out(&self) -> bool {
        self.primary_status == STATUS_TIMEOUT
    }
}

/// Applies 32-bit signed wrap, so `0xC0000005` reads as `-1073741819`.
pub fn wrap_status(raw: i64) -> i32 {
    raw as u32 as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Default)]
struct Capture {
    lines: Vec<String>,
    first_stdout: Option<String>,
}

impl Capture {
    fn push(&mut self, kind: StreamKind, line: String, suppress_output: bool, terminal: &Terminal) {
        debug!(stream = ?kind, "{}", line);

        if !suppress_output {
            terminal.write_str(&line);
            terminal.write_str("\n");
            terminal.flush();
        }

        if kind == StreamKind::Stdout && self.first_stdout.is_none() {
            self.first_stdout = Some(line.clone());
        }

        self.lines.push(line);
    }
}

/// Runs `command` to completion (or until `options.timeout`) and folds every
/// failure mode into the returned statuses.
///
/// Only logs at debug level: callers may have a status row open, and
/// surface failures themselves once it is closed.
pub async fn invoke(
    command: &ExternalCommand,
    options: InvokeOptions,
    terminal: &Terminal,
) -> ExecutionResult {
    let start = Instant::now();

    if command.program.trim().is_empty() {
        debug!("refusing to spawn an empty program name");
        return ExecutionResult::failed(STATUS_FAILURE, start);
    }

    debug!(
        command = %command,
        timeout_secs = options.timeout.as_secs_f64(),
        "spawning process"
    );

    let mut child = match Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            let status = spawn_failure_status(&err);
            debug!(program = %command.program, error = %err, status, "failed to spawn process");
            return ExecutionResult::failed(status, start);
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<(StreamKind, String)>();
    let mut readers = Vec::with_capacity(2);

    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(read_stream(stdout, StreamKind::Stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(read_stream(stderr, StreamKind::Stderr, tx.clone())));
    }
    drop(tx);

    let deadline = tokio::time::Instant::now() + options.timeout;
    let mut capture = Capture::default();
    let mut exit_code: Option<i32> = None;
    let mut streams_open = true;
    let mut timed_out = false;

    while exit_code.is_none() || streams_open {
        tokio::select! {
            received = rx.recv(), if streams_open => match received {
                Some((kind, line)) => capture.push(kind, line, options.suppress_output, terminal),
                None => streams_open = false,
            },
            status = child.wait(), if exit_code.is_none() => {
                exit_code = Some(match status {
                    Ok(status) => status_code(status),
                    Err(err) => {
                        debug!(program = %command.program, error = %err, "failed to wait for process");
                        STATUS_FAILURE
                    }
                });
            },
            _ = tokio::time::sleep_until(deadline) => {
                // Past the deadline after exit only means something inherited the pipes.
                timed_out = exit_code.is_none();
                break;
            }
        }
    }

    if timed_out {
        debug!(
            program = %command.program,
            timeout_secs = options.timeout.as_secs_f64(),
            "process exceeded its deadline, killing it"
        );
        if let Err(err) = child.kill().await {
            debug!(program = %command.program, error = %err, "failed to kill timed out process");
        }
    }

    for reader in readers {
        reader.abort();
    }
    while let Ok((kind, line)) = rx.try_recv() {
        capture.push(kind, line, options.suppress_output, terminal);
    }

    let primary_status = if timed_out {
        STATUS_TIMEOUT
    } else {
        exit_code.unwrap_or(STATUS_FAILURE)
    };

    let secondary_status = if command.is_dual_status() {
        capture
            .first_stdout
            .as_deref()
            .and_then(parse_transfer_status)
            .unwrap_or(0)
    } else {
        0
    };

    debug!(
        program = %command.program,
        primary_status,
        secondary_status,
        lines = capture.lines.len(),
        "process finished"
    );

    ExecutionResult {
        primary_status,
        secondary_status,
        lines: capture.lines,
        duration: start.elapsed().as_secs_f64(),
    }
}

async fn read_stream<R>(stream: R, kind: StreamKind, tx: mpsc::UnboundedSender<(StreamKind, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut chunk = Vec::with_capacity(256);

    loop {
        chunk.clear();
        match reader.read_until(b'\n', &mut chunk).await {
            Ok(0) => break,
            Ok(_) => {
                for line in decoder::decode(&chunk) {
                    if tx.send((kind, line)).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                debug!(stream = ?kind, error = %err, "stream read failed");
                break;
            }
        }
    }
}

fn parse_transfer_status(line: &str) -> Option<i32> {
    line.trim().parse::<i64>().ok().map(wrap_status)
}

fn spawn_failure_status(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => STATUS_NOT_FOUND,
        io::ErrorKind::PermissionDenied => STATUS_NOT_EXECUTABLE,
        _ => STATUS_FAILURE,
    }
}

fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    STATUS_FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::MemorySink;
    use std::sync::Arc;

    fn sh(script: &str) -> ExternalCommand {
        ExternalCommand::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn quiet(timeout: Duration) -> InvokeOptions {
        InvokeOptions {
            suppress_output: true,
            timeout,
        }
    }

    fn sink() -> (Arc<MemorySink>, Terminal) {
        let sink = MemorySink::new();
        let terminal: Terminal = sink.clone();
        (sink, terminal)
    }

    #[test]
    fn test_dual_status_program_detection() {
        assert!(is_dual_status_program("curl"));
        assert!(is_dual_status_program("/usr/bin/curl"));
        assert!(is_dual_status_program("curl.exe"));
        assert!(!is_dual_status_program("wget"));
        assert!(!is_dual_status_program("curlish"));
    }

    #[test]
    fn test_wrap_status() {
        assert_eq!(wrap_status(404), 404);
        assert_eq!(wrap_status(4_294_967_295), -1);
        assert_eq!(wrap_status(0xC000_0005), -1_073_741_819);
        assert_eq!(wrap_status(-2), -2);
    }

    #[test]
    fn test_parse_transfer_status() {
        assert_eq!(parse_transfer_status("200"), Some(200));
        assert_eq!(parse_transfer_status(" 404 "), Some(404));
        assert_eq!(parse_transfer_status("HTTP/1.1 200"), None);
        assert_eq!(parse_transfer_status(""), None);
    }

    #[test]
    fn test_command_display() {
        let command = ExternalCommand::new("wsl", vec!["--terminate".into(), "sdk".into()]);
        assert_eq!(command.to_string(), "wsl --terminate sdk");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let (_sink, terminal) = sink();
        let result = invoke(
            &sh("echo hello; echo oops >&2; exit 3"),
            quiet(Duration::from_secs(10)),
            &terminal,
        )
        .await;

        assert_eq!(result.primary_status, 3);
        assert_eq!(result.secondary_status, 0);
        assert!(result.lines.contains(&"hello".to_string()));
        assert!(result.lines.contains(&"oops".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echoes_output_unless_suppressed() {
        let (sink, terminal) = sink();
        let options = InvokeOptions {
            suppress_output: false,
            timeout: Duration::from_secs(10),
        };
        let result = invoke(&sh("echo visible"), options, &terminal).await;

        assert!(result.success());
        assert!(sink.contents().contains("visible\n"));

        sink.clear();
        invoke(&sh("echo hidden"), quiet(Duration::from_secs(10)), &terminal).await;
        assert!(sink.writes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_127() {
        let (_sink, terminal) = sink();
        let command = ExternalCommand::new("definitely-not-a-real-program-xyz", vec![]);
        let result = invoke(&command, quiet(Duration::from_secs(5)), &terminal).await;

        assert_eq!(result.primary_status, STATUS_NOT_FOUND);
        assert!(result.lines.is_empty());
    }

    #[tokio::test]
    async fn test_empty_program_is_generic_failure() {
        let (_sink, terminal) = sink();
        let command = ExternalCommand::new("  ", vec![]);
        let result = invoke(&command, quiet(Duration::from_secs(5)), &terminal).await;

        assert_eq!(result.primary_status, STATUS_FAILURE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_the_child() {
        let (_sink, terminal) = sink();
        let started = Instant::now();
        let result = invoke(
            &sh("echo $$; exec sleep 30"),
            quiet(Duration::from_millis(300)),
            &terminal,
        )
        .await;

        assert!(result.timed_out());
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = result.lines.first().cloned().expect("pid line captured");
        let probe = std::process::Command::new("kill")
            .args(["-0", &pid])
            .stderr(Stdio::null())
            .status()
            .expect("run kill -0");
        assert!(!probe.success(), "child {pid} still alive after timeout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_termination_maps_to_128_plus_signal() {
        let (_sink, terminal) = sink();
        let result = invoke(&sh("kill -9 $$"), quiet(Duration::from_secs(10)), &terminal).await;

        assert_eq!(result.primary_status, 137);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_curl_first_line_becomes_secondary_status() {
        let dir = tempfile::tempdir().unwrap();
        let fake_curl = dir.path().join("curl");
        std::os::unix::fs::symlink("/bin/sh", &fake_curl).unwrap();
        let program = fake_curl.display().to_string();
        let (_sink, terminal) = sink();

        let command = ExternalCommand::new(program.clone(), vec!["-c".into(), "echo 404".into()]);
        let result = invoke(&command, quiet(Duration::from_secs(10)), &terminal).await;
        assert_eq!(result.primary_status, 0);
        assert_eq!(result.secondary_status, 404);

        let command = ExternalCommand::new(
            program,
            vec!["-c".into(), "echo not-a-code; echo 500".into()],
        );
        let result = invoke(&command, quiet(Duration::from_secs(10)), &terminal).await;
        assert_eq!(result.secondary_status, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_other_programs_never_report_secondary_status() {
        let (_sink, terminal) = sink();
        let result = invoke(&sh("echo 404"), quiet(Duration::from_secs(10)), &terminal).await;

        assert_eq!(result.primary_status, 0);
        assert_eq!(result.secondary_status, 0);
    }
}
