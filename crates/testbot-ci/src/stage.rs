//! Pipeline step definitions and the fixed integration pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The twelve steps of the integration pipeline, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// git fetch origin
    Fetch,

    /// git clean -xdf
    Clean,

    /// git checkout <commit>
    Checkout,

    /// git reset --hard <commit>
    Reset,

    /// go install ./cmd/cored
    InstallCored,

    /// go install ./cmd/migratedb
    InstallMigratedb,

    /// migratedb -d <db1>
    MigrateDb1,

    /// migratedb -d <db2>
    MigrateDb2,

    /// migratedb -d <db3>
    MigrateDb3,

    /// mvn package, inside qa/tests
    BuildTests,

    /// ./qa/bin/test-singlecore
    TestSinglecore,

    /// ./qa/bin/test-multicore
    TestMulticore,
}

impl StepKind {
    /// Every step, in pipeline order.
    pub const ALL: [StepKind; 12] = [
        StepKind::Fetch,
        StepKind::Clean,
        StepKind::Checkout,
        StepKind::Reset,
        StepKind::InstallCored,
        StepKind::InstallMigratedb,
        StepKind::MigrateDb1,
        StepKind::MigrateDb2,
        StepKind::MigrateDb3,
        StepKind::BuildTests,
        StepKind::TestSinglecore,
        StepKind::TestMulticore,
    ];

    /// Get the step name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Fetch => "fetch",
            StepKind::Clean => "clean",
            StepKind::Checkout => "checkout",
            StepKind::Reset => "reset",
            StepKind::InstallCored => "install_cored",
            StepKind::InstallMigratedb => "install_migratedb",
            StepKind::MigrateDb1 => "migrate_db1",
            StepKind::MigrateDb2 => "migrate_db2",
            StepKind::MigrateDb3 => "migrate_db3",
            StepKind::BuildTests => "build_tests",
            StepKind::TestSinglecore => "test_singlecore",
            StepKind::TestMulticore => "test_multicore",
        }
    }

    /// 1-based position of the step in the pipeline.
    pub fn position(&self) -> usize {
        StepKind::ALL
            .iter()
            .position(|k| k == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Build the argv for this step against the given configuration and commit.
    pub fn command(&self, config: &PipelineConfig, commit: &str) -> Vec<String> {
        let argv: Vec<&str> = match self {
            StepKind::Fetch => vec!["git", "fetch", "origin"],
            StepKind::Clean => vec!["git", "clean", "-xdf"],
            StepKind::Checkout => vec!["git", "checkout", commit],
            StepKind::Reset => vec!["git", "reset", "--hard", commit],
            StepKind::InstallCored => vec!["go", "install", "./cmd/cored"],
            StepKind::InstallMigratedb => vec!["go", "install", "./cmd/migratedb"],
            StepKind::MigrateDb1 => vec!["migratedb", "-d", config.database_urls[0].as_str()],
            StepKind::MigrateDb2 => vec!["migratedb", "-d", config.database_urls[1].as_str()],
            StepKind::MigrateDb3 => vec!["migratedb", "-d", config.database_urls[2].as_str()],
            StepKind::BuildTests => vec!["mvn", "package"],
            StepKind::TestSinglecore => vec!["./qa/bin/test-singlecore"],
            StepKind::TestMulticore => vec!["./qa/bin/test-multicore"],
        };
        argv.into_iter().map(str::to_string).collect()
    }

    /// Working directory of this step, relative to the source checkout.
    pub fn working_dir(&self, source_dir: &Path) -> PathBuf {
        match self {
            StepKind::BuildTests => source_dir.join("qa").join("tests"),
            _ => source_dir.to_path_buf(),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static inputs of the pipeline, fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Root of the shared source checkout.
    pub source_dir: PathBuf,

    /// Connection strings of the three databases to migrate.
    pub database_urls: [String; 3],

    /// Per-step timeout in seconds; 0 disables it.
    pub step_timeout_secs: u64,
}

/// One external command of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    /// Which pipeline step this is.
    pub kind: StepKind,

    /// Directory the command runs in.
    pub working_dir: PathBuf,

    /// Executable to run.
    pub program: String,

    /// Arguments passed to the executable.
    pub args: Vec<String>,

    /// Timeout in seconds; 0 disables it.
    pub timeout_secs: u64,
}

impl PipelineStep {
    /// Create a step from a working directory and a full argv.
    ///
    /// Returns `None` when `argv` is empty.
    pub fn new(kind: StepKind, working_dir: impl Into<PathBuf>, argv: Vec<String>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            kind,
            working_dir: working_dir.into(),
            program,
            args: argv.collect(),
            timeout_secs: 0,
        })
    }

    /// Set the step timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Program and arguments joined by single spaces, as shown in reports.
    pub fn invocation(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build the full integration pipeline for `commit`.
pub fn standard_pipeline(config: &PipelineConfig, commit: &str) -> Vec<PipelineStep> {
    StepKind::ALL
        .iter()
        .filter_map(|kind| {
            PipelineStep::new(
                *kind,
                kind.working_dir(&config.source_dir),
                kind.command(config, commit),
            )
        })
        .map(|step| step.with_timeout(config.step_timeout_secs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig {
            source_dir: PathBuf::from("/src/chain"),
            database_urls: [
                "postgres:///core".to_string(),
                "postgres:///core-2".to_string(),
                "postgres:///core-3".to_string(),
            ],
            step_timeout_secs: 0,
        }
    }

    #[test]
    fn test_step_names_unique() {
        let mut names: Vec<_> = StepKind::ALL.iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn test_step_positions() {
        assert_eq!(StepKind::Fetch.position(), 1);
        assert_eq!(StepKind::MigrateDb3.position(), 9);
        assert_eq!(StepKind::TestMulticore.position(), 12);
    }

    #[test]
    fn test_standard_pipeline_order() {
        let steps = standard_pipeline(&config(), "abc123");
        let kinds: Vec<_> = steps.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, StepKind::ALL.to_vec());
    }

    #[test]
    fn test_commit_threaded_into_git_steps() {
        let steps = standard_pipeline(&config(), "abc123");
        assert_eq!(steps[2].invocation(), "git checkout abc123");
        assert_eq!(steps[3].invocation(), "git reset --hard abc123");
    }

    #[test]
    fn test_migrations_target_each_database() {
        let steps = standard_pipeline(&config(), "abc123");
        assert_eq!(steps[6].invocation(), "migratedb -d postgres:///core");
        assert_eq!(steps[7].invocation(), "migratedb -d postgres:///core-2");
        assert_eq!(steps[8].invocation(), "migratedb -d postgres:///core-3");
    }

    #[test]
    fn test_build_tests_runs_in_qa_dir() {
        let steps = standard_pipeline(&config(), "abc123");
        assert_eq!(steps[9].working_dir, PathBuf::from("/src/chain/qa/tests"));
        assert!(steps
            .iter()
            .filter(|s| s.kind != StepKind::BuildTests)
            .all(|s| s.working_dir == PathBuf::from("/src/chain")));
    }

    #[test]
    fn test_timeout_applied_to_every_step() {
        let mut cfg = config();
        cfg.step_timeout_secs = 900;
        assert!(standard_pipeline(&cfg, "abc").iter().all(|s| s.timeout_secs == 900));
    }

    #[test]
    fn test_empty_argv_rejected() {
        assert!(PipelineStep::new(StepKind::Fetch, ".", vec![]).is_none());
    }

    #[test]
    fn test_invocation_without_args() {
        let step = PipelineStep::new(
            StepKind::TestSinglecore,
            ".",
            vec!["./qa/bin/test-singlecore".to_string()],
        )
        .expect("step");
        assert_eq!(step.invocation(), "./qa/bin/test-singlecore");
    }
}
