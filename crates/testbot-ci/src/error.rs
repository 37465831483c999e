//! Failure produced by a pipeline step.

use crate::stage::{PipelineStep, StepKind};
use serde::Serialize;

/// A step that did not complete successfully.
///
/// Carries everything the failure report needs: which step failed, the
/// command line that was run, and whatever the command wrote to stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("step {step} failed: `{invocation}`: {reason}")]
pub struct StepFailure {
    /// Which pipeline step failed.
    pub step: StepKind,

    /// Program and arguments, space-joined.
    pub invocation: String,

    /// Captured standard error (may be empty on spawn failure).
    pub stderr: String,

    /// Exit status, spawn error or timeout description.
    pub reason: String,
}

impl StepFailure {
    /// Build a failure for `step` with captured stderr.
    pub fn new(step: &PipelineStep, stderr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.kind,
            invocation: step.invocation(),
            stderr: stderr.into(),
            reason: reason.into(),
        }
    }

    /// Text shown in the failure log: stderr, or the reason when nothing was written.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.reason
        } else {
            &self.stderr
        }
    }
}
