//! Command execution primitives with deadlines and live output capture.
//!
//! Every external tool the wizard talks to (node, npm, wrangler, URL openers) goes
//! through [`CommandRunner`], so stages can be driven by scripted runners in tests.

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::error::{CommandFailedDetails, Error, Result};
use crate::utils::wait::poll_until;

const WAIT_TICK: Duration = Duration::from_millis(25);
const READER_GRACE: Duration = Duration::from_secs(2);

/// Outcome of a finished (or killed) external command.
///
/// Exit status is folded into `succeeded`; only a failure to start the process is
/// reported as an `Err` by [`CommandRunner::run`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command: String,
    /// stdout followed by stderr. Callers may only rely on the union being searchable.
    pub combined_output: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn success(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            combined_output: output.into(),
            succeeded: true,
            exit_code: Some(0),
            timed_out: false,
            error: None,
        }
    }

    pub fn failure(
        command: impl Into<String>,
        output: impl Into<String>,
        exit_code: Option<i32>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            combined_output: output.into(),
            succeeded: false,
            exit_code,
            timed_out: false,
            error: Some(error.into()),
        }
    }

    /// Case-insensitive search for any marker in the output and error text.
    pub fn mentions_any(&self, markers: &[&str]) -> bool {
        let output = self.combined_output.to_lowercase();
        let error = self.error.as_deref().unwrap_or("").to_lowercase();
        markers.iter().any(|marker| {
            let marker = marker.to_lowercase();
            output.contains(&marker) || error.contains(&marker)
        })
    }

    pub fn failure_details(&self) -> CommandFailedDetails {
        CommandFailedDetails {
            command: self.command.clone(),
            exit_code: self.exit_code,
            timed_out: self.timed_out,
            error: self.error.clone(),
            output: self.combined_output.clone(),
        }
    }

    /// Convert a failed result into a `command.failed` / `command.timeout` error.
    pub fn require_success(self, context: &str) -> Result<Self> {
        if self.succeeded {
            return Ok(self);
        }
        let reason = self.error.clone().unwrap_or_else(|| "failed".to_string());
        Err(Error::command_failed(
            format!("{} failed: {}", context, reason),
            self.failure_details(),
        ))
    }
}

/// Exit information for a process observed through [`RunningCommand::try_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    pub code: Option<i32>,
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// Append-only byte buffer shared between reader threads and a poller.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
    }

    /// Lossy UTF-8 copy of everything appended so far.
    pub fn snapshot(&self) -> String {
        let bytes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A process started by [`CommandRunner::spawn`] whose output is still growing.
pub trait RunningCommand: Send {
    /// Snapshot of the combined stdout/stderr captured so far.
    fn output(&self) -> String;
    /// `Ok(None)` while the process is still running.
    fn try_wait(&mut self) -> Result<Option<ProcessExit>>;
    fn kill(&mut self);
}

pub trait CommandRunner {
    /// Run to completion (or until `timeout`) with stdin closed.
    fn run(&self, work_dir: &Path, argv: &[String], timeout: Duration) -> Result<CommandResult>;

    /// Start an interactive process (stdin inherited) with live output capture.
    fn spawn(&self, work_dir: &Path, argv: &[String]) -> Result<Box<dyn RunningCommand>>;

    fn locate(&self, program: &str) -> Option<PathBuf> {
        find_in_path(program)
    }
}

/// Runs real processes via `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, work_dir: &Path, argv: &[String], timeout: Duration) -> Result<CommandResult> {
        let command = display_command(argv);
        let mut child = build_command(work_dir, argv)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::command_spawn_failed(&command, e.to_string()))?;

        log_status!("exec", "{}", command);

        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(pump(out, stdout.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(pump(err, stderr.clone()));
        }

        let waited = poll_until(WAIT_TICK, timeout, || match child.try_wait() {
            Ok(Some(status)) => Some(Ok(status)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        });

        let status = match waited {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                terminate(&mut child);
                return Ok(CommandResult::failure(
                    command,
                    combine(&stdout, &stderr),
                    None,
                    format!("waiting for process failed: {}", e),
                ));
            }
            None => {
                terminate(&mut child);
                // Orphaned grandchildren may hold the pipes open, so readers are not joined.
                return Ok(CommandResult {
                    command,
                    combined_output: combine(&stdout, &stderr),
                    succeeded: false,
                    exit_code: None,
                    timed_out: true,
                    error: Some(format!("timed out after {}s", timeout.as_secs_f32())),
                });
            }
        };

        drain(readers);

        let combined_output = combine(&stdout, &stderr);
        if status.success() {
            return Ok(CommandResult {
                command,
                combined_output,
                succeeded: true,
                exit_code: status.code(),
                timed_out: false,
                error: None,
            });
        }

        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr_text = stderr.snapshot();
        let error = if stderr_text.trim().is_empty() {
            format!("exited with status {}", code)
        } else {
            format!("exited with status {}: {}", code, stderr_text.trim())
        };

        Ok(CommandResult::failure(
            command,
            combined_output,
            status.code(),
            error,
        ))
    }

    fn spawn(&self, work_dir: &Path, argv: &[String]) -> Result<Box<dyn RunningCommand>> {
        let command = display_command(argv);
        let mut child = build_command(work_dir, argv)?
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::command_spawn_failed(&command, e.to_string()))?;

        log_status!("exec", "{}", command);

        let buffer = SharedBuffer::new();
        if let Some(out) = child.stdout.take() {
            pump(out, buffer.clone());
        }
        if let Some(err) = child.stderr.take() {
            pump(err, buffer.clone());
        }

        Ok(Box::new(SystemProcess {
            child,
            buffer,
            exited: false,
        }))
    }
}

struct SystemProcess {
    child: Child,
    buffer: SharedBuffer,
    exited: bool,
}

impl RunningCommand for SystemProcess {
    fn output(&self) -> String {
        self.buffer.snapshot()
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        let status = self
            .child
            .try_wait()
            .map_err(|e| Error::internal_io(e.to_string(), Some("wait for process".to_string())))?;
        if status.is_some() {
            self.exited = true;
        }
        Ok(status.map(ProcessExit::from))
    }

    fn kill(&mut self) {
        if !self.exited {
            terminate(&mut self.child);
            self.exited = true;
        }
    }
}

impl Drop for SystemProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

fn build_command(work_dir: &Path, argv: &[String]) -> Result<Command> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        Error::validation_invalid_argument("argv", "No command provided", None, None)
    })?;

    #[cfg(windows)]
    if let Some(wrapped) = batch_shim_argv(find_in_path(program).as_deref(), args) {
        let mut cmd = Command::new(&wrapped[0]);
        cmd.args(&wrapped[1..]).current_dir(work_dir);
        return Ok(cmd);
    }

    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(work_dir);
    Ok(cmd)
}

/// `cmd /C <script> args..` when `resolved` is a `.cmd`/`.bat` shim such as the ones npm
/// installs on Windows. `CreateProcess` cannot start those directly.
#[cfg_attr(not(windows), allow(dead_code))]
fn batch_shim_argv(resolved: Option<&Path>, args: &[String]) -> Option<Vec<String>> {
    let resolved = resolved?;
    let ext = resolved.extension()?.to_string_lossy().to_ascii_lowercase();
    if ext != "cmd" && ext != "bat" {
        return None;
    }

    let mut wrapped = vec![
        "cmd".to_string(),
        "/C".to_string(),
        resolved.display().to_string(),
    ];
    wrapped.extend(args.iter().cloned());
    Some(wrapped)
}

fn pump<R: Read + Send + 'static>(mut reader: R, buffer: SharedBuffer) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buffer.append(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    })
}

fn drain(readers: Vec<JoinHandle<()>>) {
    let finished = poll_until(WAIT_TICK, READER_GRACE, || {
        readers.iter().all(|r| r.is_finished()).then_some(())
    });
    if finished.is_some() {
        for reader in readers {
            let _ = reader.join();
        }
    }
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn combine(stdout: &SharedBuffer, stderr: &SharedBuffer) -> String {
    let mut combined = stdout.snapshot();
    combined.push_str(&stderr.snapshot());
    combined
}

/// Human-readable command line for logs and error details.
pub fn display_command(argv: &[String]) -> String {
    argv.join(" ")
}

/// Convenience for building argv vectors from string literals.
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Search `PATH` for an executable, the way a shell would.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;

    #[cfg(windows)]
    let candidates: Vec<String> = ["", ".exe", ".cmd", ".bat"]
        .iter()
        .map(|ext| format!("{}{}", program, ext))
        .collect();

    #[cfg(not(windows))]
    let candidates = vec![program.to_string()];

    env::split_paths(&paths)
        .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn tmp() -> PathBuf {
        env::temp_dir()
    }

    #[test]
    fn mentions_any_is_case_insensitive() {
        let result = CommandResult::failure("x", "Error: Fetch Failed", Some(1), "exit 1");
        assert!(result.mentions_any(&["fetch failed"]));
        assert!(!result.mentions_any(&["rate limit"]));
    }

    #[test]
    fn mentions_any_checks_error_text() {
        let result = CommandResult::failure("x", "", None, "timed out after 2s");
        assert!(result.mentions_any(&["TIMED OUT"]));
    }

    #[test]
    fn require_success_maps_failure_to_error() {
        let result = CommandResult::failure("npx wrangler whoami", "nope", Some(1), "exit 1");
        let err = result.require_success("whoami").unwrap_err();
        assert_eq!(err.code.as_str(), "command.failed");
        assert_eq!(err.details["output"], "nope");
    }

    #[test]
    fn shared_buffer_accepts_concurrent_appends() {
        let buffer = SharedBuffer::new();
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        buffer.append(b"ab");
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(buffer.len(), 800);
        assert!(buffer.snapshot().chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn run_rejects_empty_argv() {
        let err = SystemRunner
            .run(&tmp(), &[], Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }

    #[test]
    fn run_reports_spawn_failure_as_error() {
        let err = SystemRunner
            .run(&tmp(), &argv(&["nonexistent_command_xyz"]), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "command.spawn_failed");
    }

    #[cfg(unix)]
    #[test]
    fn run_captures_stdout_then_stderr() {
        let result = SystemRunner
            .run(
                &tmp(),
                &argv(&["sh", "-c", "echo out; echo err >&2"]),
                Duration::from_secs(10),
            )
            .unwrap();
        assert!(result.succeeded);
        assert_eq!(result.combined_output, "out\nerr\n");
    }

    #[cfg(unix)]
    #[test]
    fn run_folds_nonzero_exit_into_result() {
        let result = SystemRunner
            .run(
                &tmp(),
                &argv(&["sh", "-c", "echo oops >&2; exit 3"]),
                Duration::from_secs(10),
            )
            .unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.error.as_deref().unwrap().contains("oops"));
    }

    #[cfg(unix)]
    #[test]
    fn run_uses_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = SystemRunner
            .run(dir.path(), &argv(&["pwd"]), Duration::from_secs(10))
            .unwrap();
        let reported = PathBuf::from(result.combined_output.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn run_kills_on_timeout_and_keeps_partial_output() {
        let started = Instant::now();
        let result = SystemRunner
            .run(
                &tmp(),
                &argv(&["sh", "-c", "echo started; sleep 5"]),
                Duration::from_millis(500),
            )
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!result.succeeded);
        assert!(result.timed_out);
        assert!(result.combined_output.contains("started"));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_streams_output_and_reports_exit() {
        let mut process = SystemRunner
            .spawn(&tmp(), &argv(&["sh", "-c", "echo hello; exit 0"]))
            .unwrap();
        let exit = poll_until(Duration::from_millis(10), Duration::from_secs(5), || {
            process.try_wait().ok().flatten()
        })
        .unwrap();
        assert!(exit.success);

        let output = poll_until(Duration::from_millis(10), Duration::from_secs(2), || {
            let out = process.output();
            out.contains("hello").then_some(out)
        });
        assert!(output.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn batch_shims_run_through_cmd() {
        let args = argv(&["deploy", "src/worker.js"]);
        let wrapped = batch_shim_argv(Some(Path::new(r"C:\npm\wrangler.CMD")), &args).unwrap();
        assert_eq!(wrapped[..2], ["cmd", "/C"]);
        assert!(wrapped[2].ends_with("wrangler.CMD"));
        assert_eq!(wrapped[3..], ["deploy", "src/worker.js"]);

        assert!(batch_shim_argv(Some(Path::new("/usr/bin/wrangler")), &args).is_none());
        assert!(batch_shim_argv(Some(Path::new(r"C:\node\node.exe")), &args).is_none());
        assert!(batch_shim_argv(None, &args).is_none());
    }

    #[test]
    fn find_in_path_locates_shell() {
        assert!(find_in_path("sh").is_some());
        assert!(find_in_path("nonexistent_command_xyz").is_none());
    }
}
