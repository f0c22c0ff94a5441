//! Child process supervision.
//!
//! [`ProcessRunner::spawn`] starts an executable with both output pipes
//! captured. Each pipe is drained by its own task into an unbounded channel,
//! so the child never blocks on a full pipe no matter how slowly (or in which
//! order) the caller consumes lines. A supervisor task owns the child and
//! ends the stream with exactly one [`ProcessEvent::Exited`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{Error, Result};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Options for a single invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cwd: Option<PathBuf>,
    /// Extra environment. `PATH_PREPEND` is prepended to `PATH` instead of
    /// being exported.
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken
}

impl RunOptions {
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String
}

/// How the child came to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited,
    Cancelled,
    TimedOut
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub termination: Termination,
    pub elapsed: Duration
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Line(OutputLine),
    /// Always the last item.
    Exited(ExitReport)
}

/// Output of a run-to-completion invocation.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr_lines: Vec<String>,
    pub report: ExitReport
}

impl CapturedOutput {
    pub fn stderr_tail(&self, lines: usize) -> String {
        let start = self.stderr_lines.len().saturating_sub(lines);
        self.stderr_lines[start..].join("\n")
    }
}

/// A spawned child. Dropping it terminates the child.
pub struct RunningProcess {
    pid: Option<u32>,
    events: UnboundedReceiverStream<ProcessEvent>,
    _guard: DropGuard
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Stream for RunningProcess {
    type Item = ProcessEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace_period: Duration
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ProcessRunner {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn spawn(&self, program: &Path, args: &[String], options: RunOptions) -> Result<RunningProcess> {
        tracing::debug!(
            program = %program.display(),
            args = ?args,
            cwd = ?options.cwd,
            "spawning process"
        );

        let mut cmd = build_command(program, args, &options.env);
        if let Some(ref cwd) = options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let readers = [
            tokio::spawn(drain(stdout, OutputStream::Stdout, tx.clone())),
            tokio::spawn(drain(stderr, OutputStream::Stderr, tx.clone()))
        ];

        let cancel = options.cancel.child_token();
        let guard = cancel.clone().drop_guard();

        tokio::spawn(supervise(Supervised {
            child,
            readers,
            tx,
            cancel,
            timeout: options.timeout,
            grace: self.grace_period,
            program: program.to_path_buf()
        }));

        Ok(RunningProcess {
            pid,
            events: UnboundedReceiverStream::new(rx),
            _guard: guard
        })
    }

    /// Runs to completion, collecting stdout and stderr.
    ///
    /// A non-zero exit is not an error here; cancellation and timeouts are.
    pub async fn output(
        &self,
        program: &Path,
        args: &[String],
        options: RunOptions
    ) -> Result<CapturedOutput> {
        let timeout = options.timeout;
        let mut process = self.spawn(program, args, options)?;
        let mut stdout = String::new();
        let mut stderr_lines = Vec::new();

        while let Some(event) = process.next().await {
            match event {
                ProcessEvent::Line(OutputLine {
                    stream: OutputStream::Stdout,
                    text
                }) => {
                    stdout.push_str(&text);
                    stdout.push('\n');
                }
                ProcessEvent::Line(OutputLine {
                    stream: OutputStream::Stderr,
                    text
                }) => stderr_lines.push(text),
                ProcessEvent::Exited(report) => {
                    return match report.termination {
                        Termination::Exited => Ok(CapturedOutput {
                            stdout,
                            stderr_lines,
                            report
                        }),
                        Termination::Cancelled => Err(Error::Cancelled),
                        Termination::TimedOut => Err(Error::Timeout {
                            program: program.to_path_buf(),
                            timeout: timeout.unwrap_or_default()
                        })
                    };
                }
            }
        }

        Err(Error::Io(std::io::Error::other("process supervisor ended without an exit report")))
    }
}

fn build_command(program: &Path, args: &[String], env: &HashMap<String, String>) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(path_prepend) = env.get("PATH_PREPEND") {
        let current_path = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![PathBuf::from(path_prepend)];
        paths.extend(std::env::split_paths(&current_path));
        if let Ok(joined) = std::env::join_paths(paths) {
            cmd.env("PATH", joined);
        }
    }

    for (key, value) in env {
        if key != "PATH_PREPEND" {
            cmd.env(key, value);
        }
    }

    cmd
}

/// Forwards lines until EOF. Keeps reading after the receiver is gone so the
/// child can never stall on a full pipe.
async fn drain<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                tracing::trace!(?stream, line = %text, "process output");
                let _ = tx.send(ProcessEvent::Line(OutputLine { stream, text }));
            }
            Err(e) => {
                tracing::warn!(?stream, error = %e, "failed to read process output");
                break;
            }
        }
    }
}

struct Supervised {
    child: Child,
    readers: [JoinHandle<()>; 2],
    tx: mpsc::UnboundedSender<ProcessEvent>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    grace: Duration,
    program: PathBuf
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    Interrupted(Termination)
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await
    }
}

async fn supervise(mut job: Supervised) {
    let started = Instant::now();

    let waited = tokio::select! {
        status = job.child.wait() => Waited::Exited(status),
        () = job.cancel.cancelled() => Waited::Interrupted(Termination::Cancelled),
        () = deadline(job.timeout) => Waited::Interrupted(Termination::TimedOut)
    };

    let (status, termination) = match waited {
        Waited::Exited(status) => (status, Termination::Exited),
        Waited::Interrupted(termination) => {
            tracing::info!(
                program = %job.program.display(),
                ?termination,
                "terminating process"
            );
            (terminate(&mut job.child, job.grace).await, termination)
        }
    };

    // Output already written is still delivered; a grandchild holding the
    // pipes open must not keep the stream alive past the grace period.
    for reader in &mut job.readers {
        if tokio::time::timeout(job.grace, &mut *reader).await.is_err() {
            reader.abort();
        }
    }

    let (code, signal) = match status {
        Ok(status) => (status.code(), exit_signal(status)),
        Err(e) => {
            tracing::error!(program = %job.program.display(), error = %e, "failed to wait for process");
            (None, None)
        }
    };

    let report = ExitReport {
        code,
        signal,
        termination,
        elapsed: started.elapsed()
    };
    tracing::debug!(program = %job.program.display(), ?report, "process finished");
    let _ = job.tx.send(ProcessEvent::Exited(report));
}

/// SIGTERM, then SIGKILL once the grace period is over.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            #[allow(clippy::cast_possible_wrap)]
            let nix_pid = Pid::from_raw(pid as i32);
            match signal::kill(nix_pid, Signal::SIGTERM) {
                Ok(()) => {
                    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                        return status;
                    }
                    tracing::warn!(pid, "process ignored SIGTERM, killing");
                }
                Err(e) => tracing::warn!(pid, error = %e, "failed to send SIGTERM")
            }
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}
