//! Subprocess execution with incremental stdout capture.

use crate::runtime::ProcessError;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// A command line plus the directory to run it from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Run `script` through `sh -c`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Shell-quoted rendering, prefixed with `cd <dir> ;` when a working
    /// directory is set.
    pub fn command_line(&self) -> String {
        let argv = shell_words::join(std::iter::once(&self.program).chain(self.args.iter()));
        match &self.current_dir {
            Some(dir) => format!(
                "cd {} ; {}",
                shell_words::quote(&dir.to_string_lossy()),
                argv
            ),
            None => argv,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Receives the full accumulated stdout after every chunk.
///
/// Updates are best effort; a sink should keep only the latest value.
#[async_trait]
pub trait LiveSink: Send + Sync {
    async fn publish(&self, output: &str);
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Exit code, or the terminating signal when there is none
    pub fn status_label(&self) -> String {
        if let Some(code) = self.status.code() {
            return code.to_string();
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = self.status.signal() {
                return format!("signal {signal}");
            }
        }
        "unknown".to_string()
    }

    pub fn combined(&self) -> String {
        format!("{} {}", self.stdout, self.stderr)
    }
}

/// Finite, single-pass sequence of output chunks read from a pipe
pub struct OutputStream<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputStream<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            buffer: vec![0; chunk_size.max(1)],
        }
    }

    /// Next chunk of output, or `None` once the writer has closed the pipe.
    /// Would-block and interrupted reads are retried.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            match self.reader.read(&mut self.buffer).await {
                Ok(0) => return Ok(None),
                Ok(n) => return Ok(Some(self.buffer[..n].to_vec())),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    chunk_size: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ProcessRunner {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run `spec` to completion in its own process group with stdin closed.
    ///
    /// Stdout is pushed to `sink` as it grows. Stderr is drained alongside
    /// so a chatty child cannot stall on a full pipe, but it is only
    /// collected once stdout has ended and the child has been reaped.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        sink: Option<&dyn LiveSink>,
    ) -> Result<ProcessOutput, ProcessError> {
        let command_line = spec.command_line();
        debug!("Local running {}", command_line);
        let io_error = |source: io::Error| ProcessError::Io {
            command: command_line.clone(),
            source,
        };

        let mut command = Command::new(spec.program());
        command
            .args(spec.arguments())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = spec.working_dir() {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        drop(child.stdin.take());
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error(io::Error::other("stdout was not captured")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error(io::Error::other("stderr was not captured")))?;

        let stderr_reader = tokio::spawn(async move {
            let mut buffer = Vec::new();
            stderr.read_to_end(&mut buffer).await.map(|_| buffer)
        });

        let mut stream = OutputStream::new(stdout, self.chunk_size);
        let accumulated = match collect_stdout(&mut stream, sink).await {
            Ok(accumulated) => accumulated,
            Err(e) => {
                abandon(&mut child, stderr_reader).await;
                return Err(io_error(e));
            }
        };

        let status = child.wait().await.map_err(io_error)?;
        let stderr = stderr_reader
            .await
            .map_err(|e| io_error(io::Error::other(e)))?
            .map_err(io_error)?;

        debug!("'{}' exited with {}", command_line, status);
        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&accumulated).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            status,
        })
    }
}

async fn collect_stdout<R: AsyncRead + Unpin>(
    stream: &mut OutputStream<R>,
    sink: Option<&dyn LiveSink>,
) -> io::Result<Vec<u8>> {
    let mut accumulated = Vec::new();
    while let Some(chunk) = stream.next_chunk().await? {
        accumulated.extend_from_slice(&chunk);
        if let Some(sink) = sink {
            let complete = complete_prefix_len(&accumulated);
            sink.publish(&String::from_utf8_lossy(&accumulated[..complete]))
                .await;
        }
    }
    Ok(accumulated)
}

/// Kill and reap a child whose stdout can no longer be read.
async fn abandon(child: &mut Child, stderr_reader: JoinHandle<io::Result<Vec<u8>>>) {
    stderr_reader.abort();
    if let Err(e) = child.kill().await {
        debug!("Could not kill child after a failed read: {}", e);
    }
}

/// Length of `bytes` without a trailing, still incomplete UTF-8 sequence.
/// Keeps each published update a prefix of the next.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { len - back } else { len };
    }
    len
}
