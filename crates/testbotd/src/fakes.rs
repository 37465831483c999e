//! In-memory collaborators for tests.

use crate::notify::{NotificationPayload, Notifier, NotifyError};
use async_trait::async_trait;
use std::sync::Mutex;
use testbot_ci::{CommandRunner, PipelineStep, StepFailure, StepKind, StepOutput};

/// Notifier that keeps every delivered payload.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationPayload>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads delivered so far, in order.
    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(payload.clone());
        }
        Ok(())
    }
}

/// Runner that records invocations and fails (or panics) on a chosen step.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    fail_on: Option<(StepKind, String)>,
    panic_on: Option<StepKind>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `step` with `stderr` as its captured error output.
    pub fn failing_on(mut self, step: StepKind, stderr: impl Into<String>) -> Self {
        self.fail_on = Some((step, stderr.into()));
        self
    }

    /// Panic when `step` is reached.
    pub fn panicking_on(mut self, step: StepKind) -> Self {
        self.panic_on = Some(step);
        self
    }

    /// Invocation strings of every step run so far.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, step: &PipelineStep) -> Result<StepOutput, StepFailure> {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(step.invocation());
        }
        if self.panic_on == Some(step.kind) {
            panic!("scripted panic in {}", step.kind);
        }
        match &self.fail_on {
            Some((kind, stderr)) if *kind == step.kind => {
                Err(StepFailure::new(step, stderr.clone(), "exit status: 1"))
            }
            _ => Ok(StepOutput::default()),
        }
    }
}
