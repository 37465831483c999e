//! Execution of a single pipeline step as an external process.

use crate::error::StepFailure;
use crate::stage::PipelineStep;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Captured result of a step that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Exit code (0 for a successful step).
    pub exit_code: i32,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Backend that runs one pipeline step.
///
/// A step is attempted exactly once. Any non-zero exit, spawn error or
/// timeout is returned as a [`StepFailure`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, step: &PipelineStep) -> Result<StepOutput, StepFailure>;
}

/// How long pipe readers may keep draining after a timed-out child is killed.
/// Grandchildren can hold the pipes open past the kill.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Runs steps as child processes with the inherited environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, step: &PipelineStep) -> Result<StepOutput, StepFailure> {
        let start = Instant::now();

        let mut child = Command::new(&step.program)
            .args(&step.args)
            .current_dir(&step.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StepFailure::new(step, "", e.to_string()))?;

        let stdout = PipeCapture::spawn(child.stdout.take());
        let stderr = PipeCapture::spawn(child.stderr.take());

        let status = if step.timeout_secs > 0 {
            let limit = Duration::from_secs(step.timeout_secs);
            match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(step = %step.kind, error = %e, "failed to kill timed-out step");
                    }
                    stdout.abort();
                    let stderr = stderr.collect_within(DRAIN_GRACE).await;
                    return Err(StepFailure::new(
                        step,
                        stderr,
                        format!("timed out after {} seconds", step.timeout_secs),
                    ));
                }
            }
        } else {
            child.wait().await
        }
        .map_err(|e| StepFailure::new(step, "", e.to_string()))?;

        let stdout = stdout.collect().await;
        let stderr = stderr.collect().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if !status.success() {
            return Err(StepFailure::new(step, stderr, status.to_string()));
        }

        debug!(
            step = %step.kind,
            duration_ms,
            stdout_bytes = stdout.len(),
            "step completed"
        );

        Ok(StepOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(0),
            duration_ms,
        })
    }
}

/// Background reader that drains one child pipe into a shared buffer, so
/// whatever was written survives a kill.
struct PipeCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        });
        Self { buf, task }
    }

    /// Read until end of file.
    async fn collect(self) -> String {
        let _ = self.task.await;
        Self::text(&self.buf)
    }

    /// Whatever has arrived once the pipe closes or `grace` elapses.
    async fn collect_within(mut self, grace: Duration) -> String {
        let _ = tokio::time::timeout(grace, &mut self.task).await;
        self.task.abort();
        Self::text(&self.buf)
    }

    fn abort(self) {
        self.task.abort();
    }

    fn text(buf: &Mutex<Vec<u8>>) -> String {
        buf.lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}
