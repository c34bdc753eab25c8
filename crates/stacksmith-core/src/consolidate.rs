//! Consolidation: merging too-small partitions into a neighbor.
//!
//! Operates on the plan only. Every partition from the first structural
//! change onward is reset to planned with its base re-chained, so the
//! next materialization pass rebuilds, re-validates, and re-pushes the
//! affected suffix. Nothing is merged silently into a reviewed state.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::error::{Result, StackError};
use crate::domain::partition::Partition;
use crate::domain::plan::StackPlan;
use crate::domain::quality::StackAudit;

/// Which neighbor absorbs a too-small partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeNeighborPolicy {
    /// Merge into the previous partition; the first partition falls
    /// back to its successor.
    PreferPredecessor,
    /// Merge into the next partition; the last partition falls back to
    /// its predecessor.
    PreferSuccessor,
}

impl Default for MergeNeighborPolicy {
    fn default() -> Self {
        MergeNeighborPolicy::PreferPredecessor
    }
}

/// One applied merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationMerge {
    pub removed: String,
    pub into: String,
}

/// What consolidation changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsolidateOutcome {
    pub merges: Vec<ConsolidationMerge>,
    /// Partitions reset to planned and requiring re-materialization.
    pub revalidate: Vec<String>,
}

impl ConsolidateOutcome {
    pub fn changed(&self) -> bool {
        !self.merges.is_empty()
    }
}

/// Merge every partition the audit flagged too-small into a neighbor
/// chosen by `policy`.
///
/// A single-partition plan is left alone. The merged partition keeps
/// the absorbing neighbor's name; messages are concatenated so no
/// description is lost.
pub fn consolidate(
    plan: &mut StackPlan,
    audit: &StackAudit,
    policy: MergeNeighborPolicy,
) -> Result<ConsolidateOutcome> {
    let mut outcome = ConsolidateOutcome::default();
    let too_small: Vec<String> = audit
        .too_small_partitions()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut first_affected: Option<usize> = None;
    for name in too_small {
        if plan.partitions.len() < 2 {
            break;
        }
        let Some(idx) = plan.index_of(&name) else {
            // Already absorbed by an earlier merge this pass.
            continue;
        };

        let target = match policy {
            MergeNeighborPolicy::PreferPredecessor if idx > 0 => idx - 1,
            MergeNeighborPolicy::PreferPredecessor => idx + 1,
            MergeNeighborPolicy::PreferSuccessor if idx + 1 < plan.partitions.len() => idx + 1,
            MergeNeighborPolicy::PreferSuccessor => idx - 1,
        };
        if target >= plan.partitions.len() {
            return Err(StackError::Config(format!(
                "no merge neighbor for partition '{name}'"
            )));
        }

        let removed = plan.partitions.remove(idx);
        let target_idx = if target > idx { target - 1 } else { target };
        let absorbing = &mut plan.partitions[target_idx];

        absorbing.files.extend(removed.files.iter().cloned());
        absorbing.message = format!("{}; {}", absorbing.message, removed.message);

        info!(
            removed = %removed.name,
            into = %absorbing.name,
            "Consolidated too-small partition"
        );
        outcome.merges.push(ConsolidationMerge {
            removed: removed.name,
            into: absorbing.name.clone(),
        });
        first_affected = Some(match first_affected {
            Some(prev) => prev.min(target_idx),
            None => target_idx,
        });
    }

    if let Some(start) = first_affected {
        // Rebuild the affected suffix as fresh planned partitions with
        // re-chained bases.
        for idx in start..plan.partitions.len() {
            let base = if idx == 0 {
                plan.base_ref.clone()
            } else {
                plan.partitions[idx - 1].name.clone()
            };
            let old = &plan.partitions[idx];
            let fresh = Partition::new(
                old.name.clone(),
                base,
                old.message.clone(),
                old.files.clone(),
            );
            outcome.revalidate.push(fresh.name.clone());
            plan.partitions[idx] = fresh;
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::domain::partition::PartitionStatus;
    use crate::domain::quality::{QualityFinding, QualityFlag, SizeClass};
    use chrono::Utc;

    fn files(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    fn plan_of(parts: Vec<(&str, &[&str])>) -> StackPlan {
        let mut plan = StackPlan::new("feature", "main");
        let mut base = "main".to_string();
        for (name, paths) in parts {
            plan.partitions
                .push(Partition::new(name, base.clone(), name, files(paths)));
            base = name.to_string();
        }
        plan
    }

    fn audit_flagging(plan: &StackPlan, too_small: &[&str]) -> StackAudit {
        StackAudit {
            plan_id: plan.plan_id.clone(),
            findings: plan
                .partitions
                .iter()
                .map(|p| {
                    let small = too_small.contains(&p.name.as_str());
                    QualityFinding {
                        partition: p.name.clone(),
                        size_class: if small {
                            SizeClass::TooSmall
                        } else {
                            SizeClass::Ideal
                        },
                        flags: if small {
                            vec![QualityFlag::TooSmall]
                        } else {
                            Vec::new()
                        },
                        notes: Vec::new(),
                    }
                })
                .collect(),
            score: 90,
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_into_predecessor_by_default() {
        let mut plan = plan_of(vec![
            ("stack/01", &["a.py"]),
            ("stack/02", &["b.py"]),
            ("stack/03", &["c.py"]),
        ]);
        let audit = audit_flagging(&plan, &["stack/02"]);

        let outcome =
            consolidate(&mut plan, &audit, MergeNeighborPolicy::default()).unwrap();

        assert_eq!(plan.partitions.len(), 2);
        assert_eq!(outcome.merges.len(), 1);
        assert_eq!(outcome.merges[0].removed, "stack/02");
        assert_eq!(outcome.merges[0].into, "stack/01");
        assert!(plan.partitions[0].files.contains("b.py"));
        // The whole affected suffix is re-chained and planned again.
        assert_eq!(plan.partitions[1].base, "stack/01");
        assert_eq!(plan.partitions[0].status, PartitionStatus::Planned);
        assert_eq!(outcome.revalidate, vec!["stack/01", "stack/03"]);
    }

    #[test]
    fn test_first_partition_falls_back_to_successor() {
        let mut plan = plan_of(vec![("stack/01", &["a.py"]), ("stack/02", &["b.py"])]);
        let audit = audit_flagging(&plan, &["stack/01"]);

        let outcome =
            consolidate(&mut plan, &audit, MergeNeighborPolicy::PreferPredecessor).unwrap();

        assert_eq!(plan.partitions.len(), 1);
        assert_eq!(outcome.merges[0].into, "stack/02");
        assert_eq!(plan.partitions[0].base, "main");
        assert!(plan.partitions[0].files.contains("a.py"));
        assert!(plan.partitions[0].files.contains("b.py"));
    }

    #[test]
    fn test_prefer_successor_policy() {
        let mut plan = plan_of(vec![
            ("stack/01", &["a.py"]),
            ("stack/02", &["b.py"]),
            ("stack/03", &["c.py"]),
        ]);
        let audit = audit_flagging(&plan, &["stack/02"]);

        let outcome =
            consolidate(&mut plan, &audit, MergeNeighborPolicy::PreferSuccessor).unwrap();

        assert_eq!(outcome.merges[0].into, "stack/03");
        assert_eq!(plan.partitions.len(), 2);
        assert!(plan.partitions[1].files.contains("b.py"));
        assert!(plan.partitions[1].files.contains("c.py"));
        assert_eq!(plan.partitions[1].base, "stack/01");
    }

    #[test]
    fn test_single_partition_is_left_alone() {
        let mut plan = plan_of(vec![("stack/01", &["a.py"])]);
        let audit = audit_flagging(&plan, &["stack/01"]);

        let outcome =
            consolidate(&mut plan, &audit, MergeNeighborPolicy::default()).unwrap();

        assert!(!outcome.changed());
        assert_eq!(plan.partitions.len(), 1);
    }

    #[test]
    fn test_two_adjacent_small_partitions_collapse_once_each() {
        let mut plan = plan_of(vec![
            ("stack/01", &["a.py"]),
            ("stack/02", &["b.py"]),
            ("stack/03", &["c.py"]),
        ]);
        let audit = audit_flagging(&plan, &["stack/02", "stack/03"]);

        let outcome =
            consolidate(&mut plan, &audit, MergeNeighborPolicy::default()).unwrap();

        assert_eq!(outcome.merges.len(), 2);
        assert_eq!(plan.partitions.len(), 1);
        assert_eq!(plan.partitions[0].files.len(), 3);
    }

    #[test]
    fn test_messages_are_concatenated() {
        let mut plan = plan_of(vec![("stack/01", &["a.py"]), ("stack/02", &["b.py"])]);
        let audit = audit_flagging(&plan, &["stack/02"]);

        consolidate(&mut plan, &audit, MergeNeighborPolicy::default()).unwrap();
        assert!(plan.partitions[0].message.contains("stack/01"));
        assert!(plan.partitions[0].message.contains("stack/02"));
    }

    #[test]
    fn test_coverage_preserved_across_merges() {
        let mut plan = plan_of(vec![
            ("stack/01", &["a.py"]),
            ("stack/02", &["b.py"]),
            ("stack/03", &["c.py"]),
        ]);
        let changeset = files(&["a.py", "b.py", "c.py"]);
        let audit = audit_flagging(&plan, &["stack/01", "stack/03"]);

        consolidate(&mut plan, &audit, MergeNeighborPolicy::default()).unwrap();
        plan.verify_coverage(&changeset).unwrap();
    }
}
