//! Read-only quality audit over a materialized stack.
//!
//! The audit inspects the plan and the analysis it came from; it never
//! mutates branches or statuses. Findings are advisory and feed the
//! report and the consolidation stage.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;

use crate::analyzer::Analysis;
use crate::domain::plan::StackPlan;
use crate::domain::quality::{QualityFinding, QualityFlag, SizeClass, StackAudit};

/// Score deductions per flag occurrence.
const DEDUCT_TOO_SMALL: u32 = 5;
const DEDUCT_TOO_LARGE: u32 = 10;
const DEDUCT_MISSING_TESTS: u32 = 10;
const DEDUCT_NON_ADJACENT: u32 = 15;
const DEDUCT_WEAK_DESCRIPTION: u32 = 5;

/// Messages shorter than this are flagged as weak descriptions.
const MIN_DESCRIPTION_CHARS: usize = 16;

/// Audit a plan. Partitions without a measured line count fall back to
/// the sum of their files' source-side line counts.
pub fn audit(plan: &StackPlan, analysis: &Analysis) -> StackAudit {
    let tags: BTreeMap<&str, _> = analysis
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.tag))
        .collect();
    let line_counts: BTreeMap<&str, u64> = analysis
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.lines))
        .collect();

    let mut findings = Vec::with_capacity(plan.partitions.len());
    let mut deductions = 0u32;

    for (idx, partition) in plan.partitions.iter().enumerate() {
        let mut flags = Vec::new();
        let mut notes = Vec::new();

        let lines = partition.lines_changed.unwrap_or_else(|| {
            partition
                .files
                .iter()
                .filter_map(|p| line_counts.get(p.as_str()))
                .sum()
        });
        let size_class = SizeClass::classify(lines);
        match size_class {
            SizeClass::TooSmall => {
                flags.push(QualityFlag::TooSmall);
                notes.push(format!("{lines} lines changed, candidate for merging"));
                deductions += DEDUCT_TOO_SMALL;
            }
            SizeClass::TooLarge => {
                flags.push(QualityFlag::TooLarge);
                notes.push(format!("{lines} lines changed, consider splitting"));
                deductions += DEDUCT_TOO_LARGE;
            }
            _ => {}
        }

        let has_impl = partition
            .files
            .iter()
            .filter_map(|p| tags.get(p.as_str()))
            .any(|t| t.is_implementation());
        let has_tests = partition
            .files
            .iter()
            .filter_map(|p| tags.get(p.as_str()))
            .any(|t| matches!(t, crate::domain::changed_file::FileTag::Test));
        if has_impl && !has_tests {
            flags.push(QualityFlag::MissingPairedTests);
            notes.push("implementation changes without accompanying tests".to_string());
            deductions += DEDUCT_MISSING_TESTS;
        }

        for path in &partition.files {
            for target in analysis.graph.imports_of(path) {
                if let Some(owner) = plan.partition_index_of(target) {
                    if idx > 0 && owner + 1 < idx {
                        flags.push(QualityFlag::NonAdjacentDependency);
                        notes.push(format!(
                            "{path} depends on {target} from non-adjacent partition {}",
                            plan.partitions[owner].name
                        ));
                        deductions += DEDUCT_NON_ADJACENT;
                    }
                }
            }
        }

        if partition.message.trim().len() < MIN_DESCRIPTION_CHARS {
            flags.push(QualityFlag::WeakDescription);
            notes.push("commit message is too short to review against".to_string());
            deductions += DEDUCT_WEAK_DESCRIPTION;
        }

        findings.push(QualityFinding {
            partition: partition.name.clone(),
            size_class,
            flags,
            notes,
        });
    }

    let score = 100u32.saturating_sub(deductions) as u8;
    info!(plan_id = %plan.plan_id, score, "Stack audit complete");

    StackAudit {
        plan_id: plan.plan_id.clone(),
        findings,
        score,
        evaluated_at: Utc::now(),
    }
}
