use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::{DriverError, Result};

/// Longest slice of combined output carried inside a `CommandFailed` error.
const FAILURE_OUTPUT_LIMIT: usize = 4000;

// ─── OutputSink ───────────────────────────────────────────────────────────

/// Receives every line a subprocess writes to stdout or stderr.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_line(&self, _line: &str) {}
}

// ─── Options / output ─────────────────────────────────────────────────────

/// Per-invocation settings layered over the [`Shell`] defaults.
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Return the output of a non-zero exit instead of failing.
    pub allow_err_exit: bool,
    pub timeout: Option<Duration>,
}

impl ShellOptions {
    pub fn allow_err_exit() -> Self {
        Self {
            allow_err_exit: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

// ─── Shell ────────────────────────────────────────────────────────────────

/// Runs commands with a shared environment, working directory and output sink.
#[derive(Clone)]
pub struct Shell {
    sink: Arc<dyn OutputSink>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl Shell {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    fn command(&self, program: &Path, args: &[String], opts: &ShellOptions) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(cwd) = opts.cwd.as_ref().or(self.cwd.as_ref()) {
            cmd.current_dir(cwd);
        }
        // Per-call entries come last so they win over shell defaults.
        for (k, v) in self.env.iter().chain(opts.env.iter()) {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run a command to completion, streaming its output into the sink.
    ///
    /// A non-zero exit is an error unless `opts.allow_err_exit` is set.
    pub async fn run(
        &self,
        program: &Path,
        args: &[String],
        opts: &ShellOptions,
    ) -> Result<ShellOutput> {
        let rendered = render_command(program, args);
        self.sink.write_line(&format!("$ {rendered}"));
        tracing::debug!(command = %rendered, "running command");

        let start = Instant::now();
        let mut child = self
            .command(program, args, opts)
            .spawn()
            .map_err(|source| spawn_error(program, &rendered, source))?;

        let out_task = tokio::spawn(collect_lines(child.stdout.take(), self.sink.clone()));
        let err_task = tokio::spawn(collect_lines(child.stderr.take(), self.sink.clone()));

        let status = match opts.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_elapsed) => {
                    let _ = child.kill().await;
                    out_task.abort();
                    err_task.abort();
                    tracing::warn!(command = %rendered, "command timed out after {}s", limit.as_secs());
                    return Err(DriverError::Timeout {
                        command: rendered,
                        after: limit,
                    });
                }
            },
            None => child.wait().await?,
        };

        let output = ShellOutput {
            exit_code: status.code(),
            stdout: out_task.await.unwrap_or_default(),
            stderr: err_task.await.unwrap_or_default(),
        };
        tracing::debug!(
            command = %rendered,
            exit_code = ?output.exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "command finished"
        );

        if !output.success() && !opts.allow_err_exit {
            return Err(DriverError::CommandFailed {
                command: rendered,
                code: output.exit_code,
                output: tail(&output.combined(), FAILURE_OUTPUT_LIMIT),
            });
        }
        Ok(output)
    }

    /// Start a long-running command whose output lines can be awaited.
    pub fn spawn(
        &self,
        program: &Path,
        args: &[String],
        opts: &ShellOptions,
    ) -> Result<BackgroundProcess> {
        let rendered = render_command(program, args);
        self.sink.write_line(&format!("$ {rendered} &"));
        tracing::debug!(command = %rendered, "spawning background command");

        let mut child = self
            .command(program, args, opts)
            .spawn()
            .map_err(|source| spawn_error(program, &rendered, source))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let transcript = Arc::new(Mutex::new(String::new()));
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone(), Arc::clone(&transcript), self.sink.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx, Arc::clone(&transcript), self.sink.clone());
        }

        Ok(BackgroundProcess {
            command: rendered,
            child,
            lines: rx,
            transcript,
        })
    }
}

// ─── BackgroundProcess ────────────────────────────────────────────────────

/// A running subprocess whose stdout and stderr are merged into one line feed.
///
/// Killed by [`BackgroundProcess::stop`] or, failing that, on drop.
pub struct BackgroundProcess {
    command: String,
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
    transcript: Arc<Mutex<String>>,
}

impl BackgroundProcess {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Everything the process has written so far.
    pub fn transcript(&self) -> String {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Wait until a line satisfying `pred` appears and return it.
    ///
    /// Fails with `ExitedEarly` if both output streams close first, or with
    /// `Timeout` when `limit` elapses.
    pub async fn wait_for_line<F>(&mut self, pred: F, limit: Duration) -> Result<String>
    where
        F: Fn(&str) -> bool,
    {
        let lines = &mut self.lines;
        let found = tokio::time::timeout(limit, async move {
            while let Some(line) = lines.recv().await {
                if pred(&line) {
                    return Some(line);
                }
            }
            None
        })
        .await;

        match found {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(DriverError::ExitedEarly {
                command: self.command.clone(),
                output: tail(&self.transcript(), FAILURE_OUTPUT_LIMIT),
            }),
            Err(_elapsed) => Err(DriverError::Timeout {
                command: self.command.clone(),
                after: limit,
            }),
        }
    }

    /// Kill the process and wait for it to exit (best-effort).
    pub async fn stop(mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
        tracing::debug!(command = %self.command, "background command stopped");
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────

async fn collect_lines<R>(reader: Option<R>, sink: Arc<dyn OutputSink>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = String::new();
    let Some(reader) = reader else {
        return buf;
    };
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    while let Some(line) = read_lossy_line(&mut reader, &mut raw).await {
        sink.write_line(&line);
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(&line);
    }
    buf
}

fn forward_lines<R>(
    reader: R,
    tx: mpsc::UnboundedSender<String>,
    transcript: Arc<Mutex<String>>,
    sink: Arc<dyn OutputSink>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        // Keep draining after the receiver is gone so the child never blocks
        // on a full pipe.
        while let Some(line) = read_lossy_line(&mut reader, &mut raw).await {
            sink.write_line(&line);
            if let Ok(mut t) = transcript.lock() {
                if !t.is_empty() {
                    t.push('\n');
                }
                t.push_str(&line);
            }
            let _ = tx.send(line);
        }
    });
}

/// Next line without its terminator. Invalid UTF-8 is replaced rather than
/// ending the stream; `None` at EOF or on a read error.
async fn read_lossy_line<R>(reader: &mut BufReader<R>, raw: &mut Vec<u8>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    raw.clear();
    match reader.read_until(b'\n', raw).await {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            if raw.last() == Some(&b'\n') {
                raw.pop();
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
            }
            Some(String::from_utf8_lossy(raw).into_owned())
        }
    }
}

fn spawn_error(program: &Path, display: &str, source: std::io::Error) -> DriverError {
    if source.kind() == std::io::ErrorKind::NotFound {
        DriverError::NotFound(program.display().to_string())
    } else {
        DriverError::Spawn {
            command: display.to_string(),
            source,
        }
    }
}

/// Locate a binary: paths are used as given, bare names are searched on PATH.
pub fn resolve_binary(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() || path.components().count() > 1 {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(DriverError::NotFound(name.to_string()))
        };
    }
    which::which(name).map_err(|_| DriverError::NotFound(name.to_string()))
}

pub fn render_command(program: &Path, args: &[String]) -> String {
    let mut parts = vec![program.display().to_string()];
    for arg in args {
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            parts.push(format!("'{arg}'"));
        } else {
            parts.push(arg.clone());
        }
    }
    parts.join(" ")
}

fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}
