//! Remote auto-fix: repair a pushed partition and propagate forward.

use chrono::Utc;
use tracing::{info, warn};

use crate::autofix::classify::classify_failure;
use crate::autofix::index::ArtifactIndex;
use crate::domain::error::Result;
use crate::domain::fix::{FixRecord, FixScope};
use crate::domain::plan::StackPlan;
use crate::validator::PartitionValidator;
use crate::vcs::{MergeOutcome, Vcs};

/// Outcome of a remote fix attempt. Conflicts are reported, never
/// resolved; a conflicted stack is handed back to the operator with the
/// partition that stopped propagation.
#[derive(Debug)]
pub enum RemoteFixOutcome {
    /// The failure was outside the taxonomy or no artifact was found.
    NotApplicable { record: FixRecord },
    /// Fix applied and propagated through the whole downstream chain.
    Repaired {
        record: FixRecord,
        /// Partition names re-validated after the fix, in stack order.
        revalidated: Vec<String>,
    },
    /// Propagation stopped at a merge conflict or a failed
    /// re-validation.
    Conflicted {
        record: FixRecord,
        partition: String,
        reason: String,
    },
}

impl RemoteFixOutcome {
    pub fn is_repaired(&self) -> bool {
        matches!(self, RemoteFixOutcome::Repaired { .. })
    }
}

/// Repair the pushed partition at `idx` from a downstream artifact and
/// merge the change forward through every later partition.
///
/// The search is strictly downstream: a remote failure of a pushed
/// partition means something it needs landed later in the stack.
/// Each downstream partition is merged from its predecessor and
/// re-validated; the first conflict or validation failure stops
/// propagation and the stack is left for the operator.
pub async fn attempt_remote_fix(
    vcs: &dyn Vcs,
    validator: &dyn PartitionValidator,
    plan: &StackPlan,
    idx: usize,
    failure_log: &str,
) -> Result<RemoteFixOutcome> {
    let partition = &plan.partitions[idx];
    let classified = classify_failure(failure_log);

    if !classified.actionable() {
        warn!(
            partition = %partition.name,
            class = ?classified.class,
            "Remote failure is not auto-fixable"
        );
        return Ok(RemoteFixOutcome::NotApplicable {
            record: FixRecord::unresolved(
                classified.class,
                classified.artifact.unwrap_or_else(|| "unclassified".to_string()),
            ),
        });
    }
    let artifact = classified.artifact.clone().unwrap_or_default();

    let mut index = ArtifactIndex::new();
    for downstream in &plan.partitions[idx + 1..] {
        index.add_scope(
            FixScope::DownstreamPartition,
            downstream.name.clone(),
            downstream.files.clone(),
        );
    }

    let Some(candidate) = index.find(&artifact) else {
        warn!(
            partition = %partition.name,
            artifact = %artifact,
            "No downstream artifact found"
        );
        return Ok(RemoteFixOutcome::NotApplicable {
            record: FixRecord::unresolved(classified.class, artifact),
        });
    };

    info!(
        partition = %partition.name,
        artifact = %artifact,
        path = %candidate.path,
        from = %candidate.location,
        "Applying remote fix"
    );
    vcs.checkout(&partition.name)?;
    vcs.checkout_file_from(&candidate.location, &candidate.path)?;
    vcs.commit_all(&format!(
        "Pull {} forward from {}",
        candidate.path, candidate.location
    ))?;

    let mut record = FixRecord {
        failure_class: classified.class,
        artifact,
        scope: Some(candidate.scope),
        found_in: Some(candidate.location),
        propagated: true,
        propagation_ok: None,
        applied_at: Utc::now(),
    };

    let mut revalidated = Vec::new();
    let fixed = validator.validate(&partition.name).await?;
    if !fixed.passed() {
        record.propagation_ok = Some(false);
        return Ok(RemoteFixOutcome::Conflicted {
            record,
            partition: partition.name.clone(),
            reason: "partition does not validate after remote fix".to_string(),
        });
    }
    revalidated.push(partition.name.clone());

    for j in idx + 1..plan.partitions.len() {
        let current = &plan.partitions[j];
        let predecessor = &plan.partitions[j - 1];

        vcs.checkout(&current.name)?;
        match vcs.merge(&predecessor.name)? {
            MergeOutcome::Clean => {}
            MergeOutcome::Conflict { paths } => {
                vcs.abort_merge()?;
                record.propagation_ok = Some(false);
                return Ok(RemoteFixOutcome::Conflicted {
                    record,
                    partition: current.name.clone(),
                    reason: format!("merge conflict in [{}]", paths.join(", ")),
                });
            }
        }

        let result = validator.validate(&current.name).await?;
        if !result.passed() {
            record.propagation_ok = Some(false);
            return Ok(RemoteFixOutcome::Conflicted {
                record,
                partition: current.name.clone(),
                reason: "validation failed after forward merge".to_string(),
            });
        }
        revalidated.push(current.name.clone());
    }

    // Refresh the remote view of everything already pushed.
    for updated in &plan.partitions[idx..] {
        if updated.is_pushed() {
            vcs.push(&updated.name)?;
        }
    }

    record.propagation_ok = Some(true);
    info!(
        partitions = revalidated.len(),
        "Remote fix propagated cleanly"
    );
    Ok(RemoteFixOutcome::Repaired {
        record,
        revalidated,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::domain::partition::{Partition, PartitionStatus};
    use crate::fakes::{MemoryVcs, ScriptedValidator};

    fn files(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    fn pushed(mut p: Partition) -> Partition {
        p.transition(PartitionStatus::Materialized).unwrap();
        p.transition(PartitionStatus::Validated).unwrap();
        p.transition(PartitionStatus::Pushed).unwrap();
        p
    }

    fn three_partition_plan() -> StackPlan {
        let mut plan = StackPlan::new("feature", "main");
        plan.partitions.push(pushed(Partition::new(
            "stack/01",
            "main",
            "Data access",
            files(&["src/models/user.py"]),
        )));
        plan.partitions.push(pushed(Partition::new(
            "stack/02",
            "stack/01",
            "Business logic",
            files(&["src/services/signup.py"]),
        )));
        plan.partitions.push(pushed(Partition::new(
            "stack/03",
            "stack/02",
            "Tests",
            files(&["tests/fixtures/users.json"]),
        )));
        plan
    }

    fn stacked_vcs() -> MemoryVcs {
        let vcs = MemoryVcs::new("main");
        vcs.seed_branch("stack/01", "main", &[("src/models/user.py", "user\n")]);
        vcs.seed_branch(
            "stack/02",
            "stack/01",
            &[("src/services/signup.py", "signup\n")],
        );
        vcs.seed_branch(
            "stack/03",
            "stack/02",
            &[("tests/fixtures/users.json", "{}\n")],
        );
        vcs
    }

    #[tokio::test]
    async fn test_downstream_artifact_propagates_cleanly() {
        let vcs = stacked_vcs();
        let validator = ScriptedValidator::passing();
        let plan = three_partition_plan();

        // stack/01 fails remotely: its tests need a fixture that landed
        // in stack/03.
        let outcome = attempt_remote_fix(
            &vcs,
            &validator,
            &plan,
            0,
            "No such file or directory: 'tests/fixtures/users.json'",
        )
        .await
        .unwrap();

        let RemoteFixOutcome::Repaired { record, revalidated } = outcome else {
            panic!("expected repaired outcome");
        };
        assert_eq!(record.scope, Some(FixScope::DownstreamPartition));
        assert_eq!(record.found_in.as_deref(), Some("stack/03"));
        assert_eq!(record.propagation_ok, Some(true));
        assert_eq!(revalidated, vec!["stack/01", "stack/02", "stack/03"]);

        // The fixture now exists at every level of the stack.
        for branch in ["stack/01", "stack/02", "stack/03"] {
            assert!(vcs
                .read_file(branch, "tests/fixtures/users.json")
                .unwrap()
                .is_some());
        }
        // Everything pushed got re-pushed.
        assert_eq!(vcs.pushed_branches().len(), 3);
    }

    #[tokio::test]
    async fn test_conflict_stops_propagation() {
        let vcs = MemoryVcs::new("main");
        vcs.seed_branch("seeded", "main", &[("shared.py", "base\n")]);
        vcs.seed_branch("stack/01", "seeded", &[("shared.py", "one\n")]);
        vcs.seed_branch(
            "stack/02",
            "seeded",
            &[("shared.py", "two\n"), ("tests/fixtures/users.json", "{}\n")],
        );

        let mut plan = StackPlan::new("feature", "main");
        plan.partitions.push(pushed(Partition::new(
            "stack/01",
            "main",
            "one",
            files(&["shared.py"]),
        )));
        plan.partitions.push(pushed(Partition::new(
            "stack/02",
            "stack/01",
            "two",
            files(&["tests/fixtures/users.json"]),
        )));

        let validator = ScriptedValidator::passing();
        let outcome = attempt_remote_fix(
            &vcs,
            &validator,
            &plan,
            0,
            "No such file or directory: 'tests/fixtures/users.json'",
        )
        .await
        .unwrap();

        let RemoteFixOutcome::Conflicted {
            record,
            partition,
            reason,
        } = outcome
        else {
            panic!("expected conflicted outcome");
        };
        assert_eq!(partition, "stack/02");
        assert!(reason.contains("shared.py"));
        assert_eq!(record.propagation_ok, Some(false));
        // The conflicted branch was left at its pre-merge state.
        assert_eq!(
            vcs.read_file("stack/02", "shared.py").unwrap().as_deref(),
            Some("two\n")
        );
    }

    #[tokio::test]
    async fn test_upstream_scopes_are_never_searched() {
        let vcs = stacked_vcs();
        let validator = ScriptedValidator::passing();
        let plan = three_partition_plan();

        // stack/03 fails wanting a file that only exists upstream; the
        // remote fixer must not touch it.
        let outcome = attempt_remote_fix(
            &vcs,
            &validator,
            &plan,
            2,
            "ModuleNotFoundError: No module named 'models.user'",
        )
        .await
        .unwrap();

        assert!(matches!(outcome, RemoteFixOutcome::NotApplicable { .. }));
        assert!(validator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_revalidation_reports_conflict() {
        let vcs = stacked_vcs();
        let validator = ScriptedValidator::passing();
        validator.script_failure("stack/02", "assert broke after merge");
        let plan = three_partition_plan();

        let outcome = attempt_remote_fix(
            &vcs,
            &validator,
            &plan,
            0,
            "No such file or directory: 'tests/fixtures/users.json'",
        )
        .await
        .unwrap();

        let RemoteFixOutcome::Conflicted { partition, .. } = outcome else {
            panic!("expected conflicted outcome");
        };
        assert_eq!(partition, "stack/02");
    }
}
