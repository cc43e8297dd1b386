//! Launching the external scraper and capturing its output.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::core::ExecutionError;

/// Bytes of stderr kept for diagnostics.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// Fixed scraper entry point: `program [args..] <parameters-json>`.
#[derive(Debug, Clone)]
pub struct ScraperCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

/// What the scraper left behind once it exited.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    /// Whether the exit status was zero.
    pub success: bool,
    /// Tail of stderr, lossily decoded.
    pub stderr: String,
}

impl ScraperCommand {
    /// Create a command for `program` with fixed leading `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Kill the scraper if it runs longer than `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program being launched.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the scraper with `parameters` as its last argument, streaming stdout
    /// into a new file at `log_path`.
    ///
    /// The log file must not exist yet. Dropping the returned future kills the
    /// child process.
    pub async fn run(&self, parameters: &str, log_path: &Path) -> Result<ProcessOutput, ExecutionError> {
        if let Some(dir) = log_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ExecutionError::Spawn(format!("cannot create {}: {e}", dir.display())))?;
        }
        let log = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(log_path)
            .await
            .map_err(|e| ExecutionError::Spawn(format!("cannot create log {}: {e}", log_path.display())))?
            .into_std()
            .await;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(parameters)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::Spawn(format!("{}: {e}", self.program.display())))?;

        let stderr = child.stderr.take();
        let wait = async {
            let tail = async {
                match stderr {
                    Some(pipe) => read_tail(pipe, STDERR_TAIL_BYTES).await,
                    None => Ok(Vec::new()),
                }
            };
            let (status, tail) = tokio::join!(child.wait(), tail);
            Ok::<_, std::io::Error>((status?, tail?))
        };
        let (status, stderr) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| ExecutionError::TimedOut(limit))?,
            None => wait.await,
        }
        .map_err(|e| ExecutionError::Unknown(format!("failed waiting for scraper: {e}")))?;

        Ok(ProcessOutput {
            code: status.code(),
            success: status.success(),
            stderr: stderr_tail(&stderr),
        })
    }
}

/// Drain `reader`, keeping only its last `cap` bytes.
async fn read_tail<R>(mut reader: R, cap: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(cap);
    let mut chunk = [0_u8; 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        tail.extend(&chunk[..n]);
        if tail.len() > cap {
            let excess = tail.len() - cap;
            tail.drain(..excess);
        }
    }
    Ok(tail.into())
}

fn stderr_tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_owned()
}
