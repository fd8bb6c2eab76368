//! Sandboxed execution of submissions in a child process.
//!
//! The source is written to a temporary file and handed to an interpreter
//! command (by default this binary's `exec` subcommand). The child is killed
//! when the deadline passes. Isolation is limited to the process boundary and
//! the interpreter's own builtin set; it bounds cooperative input, nothing
//! more.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Cap on each captured stream.
pub const OUTPUT_CAP_BYTES: usize = 64 * 1024;

/// How long to wait for the output readers once the child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one sandboxed run. Failures are carried in the record, never
/// raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was killed or never started.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Spawn or I/O failure text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionRecord {
    fn failed(error: String, started: Instant) -> Self {
        ExecutionRecord {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: false,
            error: Some(error),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Executes a submission and reports what happened.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, source: &str, stdin: &str) -> ExecutionRecord;
}

/// The interpreter command: a program plus leading arguments. The source
/// file path is appended as the final argument.
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl SandboxCommand {
    /// This executable's `exec` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(SandboxCommand {
            program: std::env::current_exe()?,
            args: vec!["exec".to_string()],
        })
    }
}

#[derive(Debug, Clone)]
pub struct SandboxRunner {
    command: SandboxCommand,
    timeout: Duration,
    output_cap: usize,
}

impl SandboxRunner {
    pub fn new(command: SandboxCommand, timeout: Duration) -> Self {
        SandboxRunner {
            command,
            timeout,
            output_cap: OUTPUT_CAP_BYTES,
        }
    }

    pub fn with_output_cap(mut self, bytes: usize) -> Self {
        self.output_cap = bytes;
        self
    }

    async fn execute(
        &self,
        source: &str,
        stdin: &str,
        started: Instant,
    ) -> std::io::Result<ExecutionRecord> {
        // Removed when dropped, whichever way this function returns.
        let script = tempfile::Builder::new()
            .prefix("tracelab-")
            .suffix(".tl")
            .tempfile()?;
        tokio::fs::write(script.path(), source).await?;

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(script.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let cap = self.output_cap;
        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(read_capped(out, cap)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_capped(err, cap)));

        if let Some(mut pipe) = child.stdin.take() {
            let payload = stdin.as_bytes().to_vec();
            tokio::spawn(async move {
                // The child may exit without reading; a broken pipe is fine.
                let _ = pipe.write_all(&payload).await;
            });
        }

        let (exit_code, timed_out) = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => (status?.code(), false),
            Err(_) => {
                tracing::warn!("sandboxed run exceeded {:?}, killing child", self.timeout);
                if let Err(err) = child.kill().await {
                    tracing::warn!("failed to kill sandboxed child: {}", err);
                }
                (None, true)
            }
        };

        Ok(ExecutionRecord {
            stdout: collect(stdout).await,
            stderr: collect(stderr).await,
            exit_code,
            timed_out,
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Runner for SandboxRunner {
    async fn run(&self, source: &str, stdin: &str) -> ExecutionRecord {
        let started = Instant::now();
        match self.execute(source, stdin, started).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!("sandboxed run failed: {}", err);
                ExecutionRecord::failed(err.to_string(), started)
            }
        }
    }
}

/// Reads the whole stream, keeping at most `cap` bytes. The rest is drained
/// so the child never blocks on a full pipe.
async fn read_capped<R>(mut reader: R, cap: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}

async fn collect(task: Option<tokio::task::JoinHandle<String>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, task).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(timeout_ms: u64) -> SandboxRunner {
        SandboxRunner::new(
            SandboxCommand {
                program: PathBuf::from("sh"),
                args: Vec::new(),
            },
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let record = shell(5000)
            .run("read line\necho \"got $line\"\necho oops >&2\nexit 3\n", "hello\n")
            .await;
        assert_eq!(record.stdout, "got hello\n");
        assert_eq!(record.stderr, "oops\n");
        assert_eq!(record.exit_code, Some(3));
        assert!(!record.timed_out);
        assert_eq!(record.error, None);
    }

    #[tokio::test]
    async fn infinite_loop_times_out() {
        let started = Instant::now();
        let record = shell(300).run("while true; do :; done\n", "").await;
        assert!(record.timed_out);
        assert_eq!(record.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn output_is_capped() {
        let record = shell(5000)
            .with_output_cap(10)
            .run("i=0\nwhile [ $i -lt 100 ]; do echo 0123456789; i=$((i+1)); done\n", "")
            .await;
        assert_eq!(record.stdout.len(), 10);
        assert_eq!(record.exit_code, Some(0));
    }

    #[tokio::test]
    async fn spawn_failure_is_recorded() {
        let runner = SandboxRunner::new(
            SandboxCommand {
                program: PathBuf::from("/nonexistent/tracelab-interpreter"),
                args: Vec::new(),
            },
            Duration::from_secs(1),
        );
        let record = runner.run("print(1)\n", "").await;
        assert!(record.error.is_some());
        assert!(!record.timed_out);
    }
}
