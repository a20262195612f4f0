//! Managed interactive Python interpreter.
//!
//! The interpreter executable is resolved and version-probed once per
//! [`InterpreterHandle`]. Every run spawns a fresh process whose `input()` is
//! routed through a framed stdout/stdin protocol (see `prompt_frames`), so
//! the relay can pause the program while the user types.

use super::prompt_frames::{FrameScanner, Segment};
use super::traits::ExecutionBackend;
use crate::config::PythonConfig;
use crate::console::RunHandlers;
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{watch, OnceCell};

const PRELUDE: &str = r#"
import builtins, os, sys, traceback
os.dup2(1, 2)
sys.stderr = sys.stdout
_CODEBUDDY_MARK = "\x1e__codebuddy_input__\x1f"

def _codebuddy_input(prompt=""):
    sys.stdout.write(_CODEBUDDY_MARK + str(prompt) + "\x1e")
    sys.stdout.flush()
    line = sys.stdin.readline()
    if not line:
        raise EOFError("EOF when reading a line")
    return line[:-1] if line.endswith("\n") else line

builtins.input = _codebuddy_input
_codebuddy_path = sys.argv[1]
sys.argv = ["main.py"]
with open(_codebuddy_path, encoding="utf-8") as _codebuddy_file:
    _codebuddy_source = _codebuddy_file.read()

try:
    exec(compile(_codebuddy_source, "main.py", "exec"), {"__name__": "__main__", "__builtins__": builtins})
except SystemExit:
    raise
except BaseException as _codebuddy_error:
    print("Error: " + str(_codebuddy_error))
    traceback.print_exc(file=sys.stdout)
    sys.stdout.flush()
    sys.exit(1)
"#;

const READ_CHUNK: usize = 4096;

/// Resolved interpreter details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterInfo {
    pub program: String,
    pub version: String,
}

/// Owner of the interpreter lifecycle.
///
/// Created cheaply; the first run (or [`InterpreterHandle::ensure_ready`])
/// probes the interpreter. Shared via `Arc`. After [`shutdown`] every active
/// run is stopped and new runs are refused.
///
/// [`shutdown`]: InterpreterHandle::shutdown
pub struct InterpreterHandle {
    program: String,
    info: OnceCell<InterpreterInfo>,
    shutdown_tx: watch::Sender<bool>,
}

impl InterpreterHandle {
    pub fn new(config: &PythonConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            program: config.interpreter.clone(),
            info: OnceCell::new(),
            shutdown_tx,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn is_ready(&self) -> bool {
        self.info.initialized()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Probe the interpreter on first call; later calls reuse the result.
    pub async fn ensure_ready(&self) -> anyhow::Result<&InterpreterInfo> {
        if self.is_shut_down() {
            bail!("Python interpreter has been shut down");
        }
        self.info
            .get_or_try_init(|| probe_interpreter(&self.program))
            .await
    }

    /// Stop active runs and refuse new ones.
    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::info!(program = %self.program, "python.shutdown");
        }
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

async fn probe_interpreter(program: &str) -> anyhow::Result<InterpreterInfo> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Python interpreter '{program}' could not be started"))?;

    if !output.status.success() {
        bail!(
            "Python interpreter '{program}' failed its version check ({})",
            output.status
        );
    }

    // Older interpreters print the version on stderr.
    let raw = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    let version = String::from_utf8_lossy(&raw).trim().to_string();
    tracing::debug!(program, version = %version, "python.ready");
    Ok(InterpreterInfo {
        program: program.to_string(),
        version,
    })
}

/// `input()` consumes exactly one line; anything after a line break would be
/// read by the next `input()` call without a prompt ever reaching the relay.
fn first_line(value: &str) -> &str {
    value.split(['\r', '\n']).next().unwrap_or_default()
}

pub struct PythonBackend {
    handle: Arc<InterpreterHandle>,
}

impl PythonBackend {
    pub fn new(handle: Arc<InterpreterHandle>) -> Self {
        Self { handle }
    }

    fn spawn(program: &str, script: &std::path::Path) -> anyhow::Result<Child> {
        Command::new(program)
            .arg("-u")
            .arg("-c")
            .arg(PRELUDE)
            .arg(script)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start '{program}'"))
    }
}

#[async_trait]
impl ExecutionBackend for PythonBackend {
    fn name(&self) -> &str {
        "python"
    }

    async fn run(&self, source: &str, handlers: &RunHandlers) -> anyhow::Result<()> {
        let info = self.handle.ensure_ready().await?;
        let mut shutdown = self.handle.subscribe();

        let mut script = tempfile::Builder::new()
            .prefix("codebuddy-")
            .suffix(".py")
            .tempfile()
            .context("Failed to stage program source")?;
        script.write_all(source.as_bytes())?;
        script.flush()?;

        let mut child = Self::spawn(&info.program, script.path())?;
        let mut stdout = child.stdout.take().context("interpreter stdout unavailable")?;
        let mut stdin = child.stdin.take().context("interpreter stdin unavailable")?;
        let mut stderr = child.stderr.take().context("interpreter stderr unavailable")?;

        // Only output written before the prelude redirects fd 2 lands here
        // (a broken interpreter install, say). Drain it alongside stdout so
        // the pipe can never fill.
        let diagnostics = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let mut scanner = FrameScanner::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let read = tokio::select! {
                read = stdout.read(&mut buf) => read.context("Failed to read interpreter output")?,
                _ = shutdown.changed() => {
                    let _ = child.kill().await;
                    bail!("Python interpreter was shut down during the run");
                }
            };
            if read == 0 {
                break;
            }

            for segment in scanner.push(&buf[..read]) {
                match segment {
                    Segment::Text(text) => handlers.output(&text),
                    Segment::Prompt(prompt) => {
                        let value = tokio::select! {
                            value = handlers.input(&prompt) => value,
                            _ = shutdown.changed() => None,
                        };
                        let Some(value) = value else {
                            tracing::debug!(session = %handlers.session_id(), "python.abandoned");
                            let _ = child.kill().await;
                            return Ok(());
                        };
                        stdin
                            .write_all(format!("{}\n", first_line(&value)).as_bytes())
                            .await
                            .context("Failed to forward input to the interpreter")?;
                        stdin.flush().await?;
                    }
                }
            }
        }

        if let Some(Segment::Text(rest)) = scanner.finish() {
            handlers.output(&rest);
        }

        let status = child.wait().await.context("Failed to wait for interpreter")?;
        let diagnostics = diagnostics.await.unwrap_or_default();
        if !diagnostics.trim().is_empty() {
            handlers.error(diagnostics.trim_end());
        }

        tracing::debug!(session = %handlers.session_id(), status = %status, "python.exited");
        Ok(())
    }
}
