//! Fail-fast, strictly sequential pipeline execution.

use crate::error::StepFailure;
use crate::runner::CommandRunner;
use crate::stage::{standard_pipeline, PipelineConfig, PipelineStep};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step exited with status 0.
    Success,

    /// The first failing step; nothing after it ran.
    Failure(StepFailure),
}

impl RunOutcome {
    /// Whether the run passed.
    pub fn passed(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }

    /// The failure, if the run failed.
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            RunOutcome::Success => None,
            RunOutcome::Failure(failure) => Some(failure),
        }
    }
}

impl From<Result<(), StepFailure>> for RunOutcome {
    fn from(result: Result<(), StepFailure>) -> Self {
        match result {
            Ok(()) => RunOutcome::Success,
            Err(failure) => RunOutcome::Failure(failure),
        }
    }
}

/// Drives a [`CommandRunner`] through the integration pipeline.
pub struct Pipeline {
    runner: Arc<dyn CommandRunner>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(runner: Arc<dyn CommandRunner>, config: PipelineConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the standard pipeline against `commit`.
    pub async fn execute(&self, commit: &str) -> RunOutcome {
        let steps = standard_pipeline(&self.config, commit);
        self.execute_steps(&steps).await
    }

    /// Run `steps` in order, stopping at the first failure.
    ///
    /// The failure returned by the runner is passed through unchanged.
    pub async fn execute_steps(&self, steps: &[PipelineStep]) -> RunOutcome {
        let start = Instant::now();
        let outcome = RunOutcome::from(self.run_all(steps).await);
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            RunOutcome::Success => {
                info!(steps = steps.len(), duration_ms, "pipeline passed");
            }
            RunOutcome::Failure(failure) => {
                warn!(
                    step = %failure.step,
                    invocation = %failure.invocation,
                    reason = %failure.reason,
                    duration_ms,
                    "pipeline failed"
                );
            }
        }
        outcome
    }

    async fn run_all(&self, steps: &[PipelineStep]) -> Result<(), StepFailure> {
        for step in steps {
            info!(step = %step.kind, invocation = %step.invocation(), "Executing step");
            self.runner.run(step).await?;
        }
        Ok(())
    }
}
