//! testbot CI - integration pipeline engine
//!
//! Provides the core of the push-triggered runner:
//! - The fixed, ordered list of build/migrate/test steps
//! - A command runner that executes one step and captures its stderr
//! - A fail-fast executor that stops at the first failing step
//! - A single-flight gate that keeps runs from overlapping on the checkout

pub mod error;
pub mod gate;
pub mod pipeline;
pub mod runner;
pub mod stage;

// Re-export key types
pub use error::StepFailure;
pub use gate::{GateOutcome, RunGate};
pub use pipeline::{Pipeline, RunOutcome};
pub use runner::{CommandRunner, ProcessRunner, StepOutput};
pub use stage::{standard_pipeline, PipelineConfig, PipelineStep, StepKind};
