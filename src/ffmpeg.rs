//! FFmpeg/FFprobe command wrapper utilities
//!
//! Every invocation runs the tool directly (no shell) with explicit arguments,
//! drains stdout and stderr while the child runs, and is bounded by a
//! wall-clock timeout. A child that outlives the timeout is killed.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default wall-clock bound for a single tool invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the diagnostics text kept from a failed invocation.
const MAX_DIAGNOSTICS: usize = 4096;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("{} not found in system PATH", program.display())]
    NotInstalled { program: PathBuf },

    #[error("{} failed with {status}: {diagnostics}", program.display())]
    ExecutionFailed {
        program: PathBuf,
        status: String,
        diagnostics: String,
    },

    #[error("{} timed out after {timeout:?}", program.display())]
    TimedOut { program: PathBuf, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Builder for a single media tool invocation.
pub struct FfmpegCommand<'a> {
    program: PathBuf,
    args: Vec<OsString>,
    stdin: Option<&'a [u8]>,
    timeout: Duration,
}

impl<'a> FfmpegCommand<'a> {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("-i".into());
        self.args.push(path.as_ref().as_os_str().to_os_string());
        self
    }

    /// Read the input from standard input, fed from `data`.
    pub fn input_pipe(mut self, data: &'a [u8]) -> Self {
        self.args.push("-i".into());
        self.args.push("pipe:0".into());
        self.stdin(data)
    }

    /// Write the tool's output to standard output.
    pub fn output_pipe(mut self) -> Self {
        self.args.push("pipe:1".into());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(OsString::from));
        self
    }

    pub fn stdin(mut self, data: &'a [u8]) -> Self {
        self.stdin = Some(data);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the tool to completion and return its captured output.
    ///
    /// A non-zero exit is an error carrying stderr followed by stdout.
    pub async fn execute(self) -> Result<Output, FfmpegError> {
        let FfmpegCommand {
            program,
            args,
            stdin,
            timeout,
        } = self;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %program.display(), ?args, "Spawning media tool");

        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FfmpegError::NotInstalled {
                program: program.clone(),
            },
            _ => FfmpegError::Io(e),
        })?;

        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(data)) = (pipe, stdin) {
                match pipe.write_all(data).await {
                    Ok(()) => {}
                    // The tool may stop reading once it has seen enough.
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        debug!("Media tool closed stdin early");
                    }
                    Err(e) => warn!("Failed to feed media tool stdin: {}", e),
                }
            }
        };
        let run = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = match tokio::time::timeout(timeout, run).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(program = %program.display(), ?timeout, "Media tool timed out, killed");
                return Err(FfmpegError::TimedOut { program, timeout });
            }
        };

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                status: output.status.to_string(),
                diagnostics: diagnostics(&output),
                program,
            });
        }

        Ok(output)
    }
}

/// Stderr followed by stdout, trimmed to the most recent bytes.
fn diagnostics(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stdout.trim());
    }

    if text.len() > MAX_DIAGNOSTICS {
        let mut start = text.len() - MAX_DIAGNOSTICS;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        text = text[start..].to_string();
    }
    text
}

/// Check whether `program` can be launched and answers `-version`.
pub async fn is_tool_available(program: &Path) -> bool {
    FfmpegCommand::new(program)
        .args(&["-version"])
        .timeout(Duration::from_secs(5))
        .execute()
        .await
        .is_ok()
}
