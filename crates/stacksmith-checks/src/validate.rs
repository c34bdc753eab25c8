//! Partition validation: concurrent check execution with a joined verdict.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::check::CheckConfig;
use crate::runner::{run_check, CheckOutcome};

/// Per-partition validation result: one outcome per check, overall
/// validity is the logical AND over all of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    /// Name of the validated partition.
    pub partition: String,

    /// Per-check outcomes in discovery order.
    pub outcomes: Vec<CheckOutcome>,

    /// When validation started.
    pub started_at: DateTime<Utc>,

    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ValidationResult {
    /// Whether every check passed.
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    /// Names of the checks that failed.
    pub fn failed_checks(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.name.as_str())
            .collect()
    }

    /// Concatenated logs of failing checks, for failure classification.
    pub fn failure_log(&self) -> String {
        self.outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.log.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs the discovered check set against a materialized partition.
///
/// Checks are read-only against the same checked-out state and run
/// concurrently; the pass/fail decision is a blocking join over all of
/// them. Re-running against the same tree produces the same verdict.
#[derive(Debug, Clone)]
pub struct Validator {
    checks: Vec<CheckConfig>,
    workdir: PathBuf,
}

impl Validator {
    pub fn new(checks: Vec<CheckConfig>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            checks,
            workdir: workdir.into(),
        }
    }

    /// The working tree the checks run against.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Validate a materialized partition, joining all check outcomes.
    pub async fn validate(&self, partition: &str) -> anyhow::Result<ValidationResult> {
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        info!(partition = %partition, checks = self.checks.len(), "Validating partition");

        let futures = self
            .checks
            .iter()
            .map(|check| run_check(check, &self.workdir));
        let joined = join_all(futures).await;

        let mut outcomes = Vec::with_capacity(joined.len());
        for result in joined {
            outcomes.push(result?);
        }

        let result = ValidationResult {
            partition: partition.to_string(),
            outcomes,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if result.passed() {
            info!(partition = %partition, "Validation passed");
        } else {
            info!(
                partition = %partition,
                failed = ?result.failed_checks(),
                "Validation failed"
            );
        }

        Ok(result)
    }
}
