//! Sequential materialization: branch, commit, validate, push.
//!
//! Partitions are materialized strictly in stack order, each branched
//! from its validated predecessor. A validation failure triggers one
//! local fix attempt; if the partition still fails it is marked failed,
//! the walk halts, and later partitions stay planned. Failures never
//! cascade past the halt point.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::autofix::attempt_local_fix;
use crate::domain::error::Result;
use crate::domain::partition::{PartitionStatus, ValidationAnnotation};
use crate::domain::plan::StackPlan;
use crate::validator::PartitionValidator;
use crate::vcs::Vcs;
use stacksmith_checks::ValidationResult;

/// Materialization policy.
#[derive(Debug, Clone)]
pub struct MaterializeConfig {
    /// Partitions under this many changed lines are flagged too-small.
    /// Advisory only; nothing is blocked.
    pub min_partition_lines: u64,

    /// Whether validated partitions are pushed as they complete.
    pub push: bool,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            min_partition_lines: 40,
            push: true,
        }
    }
}

/// What the walk accomplished. A failed partition is policy, not a hard
/// error: the plan records it and the caller decides whether to replan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOutcome {
    /// Partitions validated this run, in stack order.
    pub completed: Vec<String>,

    /// Partition that failed and halted the walk, if any.
    pub failed: Option<String>,
}

impl MaterializeOutcome {
    pub fn halted(&self) -> bool {
        self.failed.is_some()
    }
}

/// Walks the plan and turns each partition into a validated branch.
pub struct Materializer {
    vcs: Arc<dyn Vcs>,
    validator: Arc<dyn PartitionValidator>,
    config: MaterializeConfig,
}

impl Materializer {
    pub fn new(
        vcs: Arc<dyn Vcs>,
        validator: Arc<dyn PartitionValidator>,
        config: MaterializeConfig,
    ) -> Self {
        Self {
            vcs,
            validator,
            config,
        }
    }

    /// Materialize every unpushed partition in order.
    ///
    /// Already-pushed partitions are skipped, so the walk resumes
    /// cleanly after a replan. Mutates partition statuses in place;
    /// the caller persists the plan afterwards.
    pub async fn materialize(&self, plan: &mut StackPlan) -> Result<MaterializeOutcome> {
        let mut outcome = MaterializeOutcome {
            completed: Vec::new(),
            failed: None,
        };

        for idx in 0..plan.partitions.len() {
            if plan.partitions[idx].is_pushed() {
                continue;
            }

            let branch_point = plan.branch_point(idx).to_string();
            let name = plan.partitions[idx].name.clone();
            info!(partition = %name, base = %branch_point, "Materializing partition");

            self.create_partition_branch(plan, idx, &branch_point)?;
            plan.partitions[idx].transition(PartitionStatus::Materialized)?;

            let result = self.validator.validate(&name).await?;
            let final_result = if result.passed() {
                result
            } else {
                warn!(
                    partition = %name,
                    failed = ?result.failed_checks(),
                    "Validation failed, attempting local fix"
                );
                let fix = attempt_local_fix(
                    self.vcs.as_ref(),
                    self.validator.as_ref(),
                    plan,
                    idx,
                    &result.failure_log(),
                )
                .await?;
                let repaired = fix.repaired();
                let revalidation = fix.revalidation;
                plan.partitions[idx].fixes.push(fix.record);

                if !repaired {
                    plan.partitions[idx].validation = Some(annotation(
                        revalidation.as_ref().unwrap_or(&result),
                    ));
                    plan.partitions[idx].transition(PartitionStatus::Failed)?;
                    outcome.failed = Some(name.clone());
                    warn!(partition = %name, "Partition failed, halting walk");
                    return Ok(outcome);
                }
                revalidation.unwrap_or(result)
            };

            let partition = &mut plan.partitions[idx];
            partition.validation = Some(annotation(&final_result));
            partition.transition(PartitionStatus::Validated)?;

            let lines = self.vcs.diff_lines(&branch_point, &name)?;
            partition.lines_changed = Some(lines);
            partition.too_small = lines < self.config.min_partition_lines;
            if partition.too_small {
                info!(partition = %name, lines, "Partition is under the size threshold");
            }

            if self.config.push {
                self.vcs.push(&name)?;
                partition.transition(PartitionStatus::Pushed)?;
                info!(partition = %name, lines, "Partition pushed");
            }
            outcome.completed.push(name);
        }

        Ok(outcome)
    }

    /// Create the partition branch from its base and commit its slice
    /// of the changeset.
    ///
    /// A leftover branch from an earlier halted run is recreated from
    /// scratch; only unpushed partitions ever reach this path.
    fn create_partition_branch(
        &self,
        plan: &StackPlan,
        idx: usize,
        branch_point: &str,
    ) -> Result<()> {
        let partition = &plan.partitions[idx];

        self.vcs.checkout(branch_point)?;
        if self.vcs.branch_exists(&partition.name)? {
            self.vcs.delete_branch(&partition.name)?;
        }
        self.vcs.create_branch(&partition.name, branch_point)?;
        self.vcs.checkout(&partition.name)?;

        for path in &partition.files {
            match self.vcs.read_file(&plan.source_ref, path)? {
                Some(_) => self.vcs.checkout_file_from(&plan.source_ref, path)?,
                None => self.vcs.remove_file(path)?,
            }
        }
        self.vcs.commit_all(&partition.message)?;
        Ok(())
    }
}

fn annotation(result: &ValidationResult) -> ValidationAnnotation {
    ValidationAnnotation {
        passed: result.passed(),
        failed_checks: result
            .failed_checks()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        completed_at: Utc::now(),
    }
}
