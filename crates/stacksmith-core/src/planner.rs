//! Partition planning: dependency-ordered grouping of the changeset.
//!
//! Components from the dependency graph are grouped by (dependency
//! level, file tag). Files connected by an import edge always land at
//! different levels, so a dependency chain becomes a chain of
//! partitions; independent files sharing a tag and level share one.
//! Import cycles collapse into a single component and therefore a
//! single partition.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::analyzer::Analysis;
use crate::domain::changed_file::FileTag;
use crate::domain::error::Result;
use crate::domain::partition::Partition;
use crate::domain::plan::StackPlan;

/// Build a fresh plan for the whole changeset.
///
/// The returned plan satisfies the coverage invariant by construction;
/// it is still verified before returning so a planner regression fails
/// loudly rather than materializing a partial stack.
pub fn plan(analysis: &Analysis, source_ref: &str, base_ref: &str) -> Result<StackPlan> {
    let mut plan = StackPlan::new(source_ref, base_ref);
    let groups = group_files(analysis, &analysis.paths());

    let mut base = plan.base_ref.clone();
    for (idx, ((_, tag), files)) in groups.into_iter().enumerate() {
        let partition = build_partition(idx + 1, tag, base.clone(), files);
        base = partition.name.clone();
        plan.partitions.push(partition);
    }

    plan.verify_coverage(&analysis.paths())?;
    info!(
        plan_id = %plan.plan_id,
        partitions = plan.partitions.len(),
        "Planned stack"
    );
    Ok(plan)
}

/// Re-plan the unpushed remainder of an existing plan.
///
/// Pushed partitions are immutable history: they are carried over
/// verbatim and their files never move. The residual files are
/// re-grouped from scratch; dependencies on already-pushed files are
/// satisfied by stacking and drop out of the grouping.
pub fn replan(current: &StackPlan, analysis: &Analysis) -> Result<StackPlan> {
    let prefix_len = current.pushed_prefix_len();
    let pushed: Vec<Partition> = current.partitions[..prefix_len].to_vec();
    let pushed_files: BTreeSet<String> = pushed
        .iter()
        .flat_map(|p| p.files.iter().cloned())
        .collect();

    let residual: BTreeSet<String> = analysis
        .paths()
        .difference(&pushed_files)
        .cloned()
        .collect();

    let mut plan = StackPlan {
        plan_id: current.plan_id.clone(),
        source_ref: current.source_ref.clone(),
        base_ref: current.base_ref.clone(),
        created_at: current.created_at,
        partitions: pushed,
    };

    let mut base = match plan.partitions.last() {
        Some(last) => last.name.clone(),
        None => plan.base_ref.clone(),
    };
    let groups = group_files(analysis, &residual);
    for (offset, ((_, tag), files)) in groups.into_iter().enumerate() {
        let partition = build_partition(prefix_len + offset + 1, tag, base.clone(), files);
        base = partition.name.clone();
        plan.partitions.push(partition);
    }

    plan.verify_coverage(&analysis.paths())?;
    info!(
        plan_id = %plan.plan_id,
        kept = prefix_len,
        partitions = plan.partitions.len(),
        "Re-planned stack"
    );
    Ok(plan)
}

/// Group a subset of the changeset by (dependency level, tag).
///
/// Levels come from the full graph, so files whose dependencies were
/// already pushed keep their relative order without re-introducing the
/// satisfied edges. The `BTreeMap` key order yields levels ascending
/// and, within a level, foundation-most tags first.
fn group_files(
    analysis: &Analysis,
    subset: &BTreeSet<String>,
) -> BTreeMap<(usize, FileTag), BTreeSet<String>> {
    let tags: BTreeMap<&str, FileTag> = analysis
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.tag))
        .collect();

    let mut groups: BTreeMap<(usize, FileTag), BTreeSet<String>> = BTreeMap::new();
    for component in analysis.graph.components() {
        let members: BTreeSet<String> = component
            .files
            .iter()
            .filter(|f| subset.contains(*f))
            .cloned()
            .collect();
        if members.is_empty() {
            continue;
        }
        // Foundation-most tag represents a mixed-tag cycle.
        let tag = members
            .iter()
            .filter_map(|f| tags.get(f.as_str()).copied())
            .min()
            .unwrap_or(FileTag::Other);
        groups.entry((component.level, tag)).or_default().extend(members);
    }
    groups
}

fn build_partition(
    ordinal: usize,
    tag: FileTag,
    base: String,
    files: BTreeSet<String>,
) -> Partition {
    let name = format!("stack/{ordinal:02}-{}", tag.slug());
    let message = describe(tag, &files);
    Partition::new(name, base, message, files)
}

/// Commit-message-grade description of a partition's content.
fn describe(tag: FileTag, files: &BTreeSet<String>) -> String {
    let stems: Vec<&str> = files
        .iter()
        .take(3)
        .map(|p| p.rsplit('/').next().unwrap_or(p))
        .collect();
    let listed = stems.join(", ");
    if files.len() > 3 {
        format!("{}: {} and {} more", tag.label(), listed, files.len() - 3)
    } else {
        format!("{}: {}", tag.label(), listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::changed_file::{ChangedFile, ChangeKind};
    use crate::domain::graph::DependencyGraph;
    use crate::domain::partition::PartitionStatus;

    fn file(path: &str, tag: FileTag) -> ChangedFile {
        ChangedFile {
            path: path.to_string(),
            tag,
            kind: ChangeKind::Added,
            lines: 50,
            imports: BTreeSet::new(),
        }
    }

    fn analysis(files: Vec<ChangedFile>, edges: &[(&str, &str)]) -> Analysis {
        let mut graph = DependencyGraph::new();
        for f in &files {
            graph.add_file(f.path.clone());
        }
        for (importer, target) in edges {
            graph.add_import(importer, target).unwrap();
        }
        Analysis { files, graph }
    }

    #[test]
    fn test_dependency_chain_becomes_partition_chain() {
        // s imports r imports m; three tags, three partitions in order.
        let a = analysis(
            vec![
                file("db/migration_01.sql", FileTag::FoundationData),
                file("src/models/user.py", FileTag::DataAccess),
                file("src/services/signup.py", FileTag::BusinessLogic),
            ],
            &[
                ("src/models/user.py", "db/migration_01.sql"),
                ("src/services/signup.py", "src/models/user.py"),
            ],
        );
        let plan = plan(&a, "feature", "main").unwrap();

        assert_eq!(plan.partitions.len(), 3);
        assert!(plan.partitions[0].files.contains("db/migration_01.sql"));
        assert!(plan.partitions[1].files.contains("src/models/user.py"));
        assert!(plan.partitions[2].files.contains("src/services/signup.py"));
        // Bases chain through the stack.
        assert_eq!(plan.partitions[0].base, "main");
        assert_eq!(plan.partitions[1].base, plan.partitions[0].name);
        assert_eq!(plan.partitions[2].base, plan.partitions[1].name);
    }

    #[test]
    fn test_independent_same_tag_files_share_a_partition() {
        let a = analysis(
            vec![
                file("src/models/user.py", FileTag::DataAccess),
                file("src/models/order.py", FileTag::DataAccess),
            ],
            &[],
        );
        let plan = plan(&a, "feature", "main").unwrap();
        assert_eq!(plan.partitions.len(), 1);
        assert_eq!(plan.partitions[0].files.len(), 2);
    }

    #[test]
    fn test_same_level_different_tags_split() {
        let a = analysis(
            vec![
                file("src/models/user.py", FileTag::DataAccess),
                file("src/services/signup.py", FileTag::BusinessLogic),
            ],
            &[],
        );
        let plan = plan(&a, "feature", "main").unwrap();
        assert_eq!(plan.partitions.len(), 2);
        // Foundation-most tag first within a level.
        assert!(plan.partitions[0].files.contains("src/models/user.py"));
    }

    #[test]
    fn test_cycle_shares_a_partition() {
        let a = analysis(
            vec![
                file("src/services/a.py", FileTag::BusinessLogic),
                file("src/services/b.py", FileTag::BusinessLogic),
            ],
            &[
                ("src/services/a.py", "src/services/b.py"),
                ("src/services/b.py", "src/services/a.py"),
            ],
        );
        let plan = plan(&a, "feature", "main").unwrap();
        assert_eq!(plan.partitions.len(), 1);
        assert_eq!(plan.partitions[0].files.len(), 2);
    }

    #[test]
    fn test_partition_names_are_ordered_and_slugged() {
        let a = analysis(
            vec![
                file("db/schema.sql", FileTag::FoundationData),
                file("src/api/routes.py", FileTag::Interface),
            ],
            &[("src/api/routes.py", "db/schema.sql")],
        );
        let plan = plan(&a, "feature", "main").unwrap();
        assert_eq!(plan.partitions[0].name, "stack/01-foundation-data");
        assert_eq!(plan.partitions[1].name, "stack/02-interface");
    }

    #[test]
    fn test_replan_keeps_pushed_prefix_verbatim() {
        let a = analysis(
            vec![
                file("db/schema.sql", FileTag::FoundationData),
                file("src/models/user.py", FileTag::DataAccess),
                file("src/services/signup.py", FileTag::BusinessLogic),
            ],
            &[
                ("src/models/user.py", "db/schema.sql"),
                ("src/services/signup.py", "src/models/user.py"),
            ],
        );
        let mut current = plan(&a, "feature", "main").unwrap();
        current.partitions[0]
            .transition(PartitionStatus::Materialized)
            .unwrap();
        current.partitions[0]
            .transition(PartitionStatus::Validated)
            .unwrap();
        current.partitions[0]
            .transition(PartitionStatus::Pushed)
            .unwrap();
        let first_name = current.partitions[0].name.clone();

        let replanned = replan(&current, &a).unwrap();
        assert_eq!(replanned.plan_id, current.plan_id);
        assert_eq!(replanned.partitions[0].name, first_name);
        assert!(replanned.partitions[0].is_pushed());
        // Suffix starts from the last pushed partition.
        assert_eq!(replanned.partitions[1].base, first_name);
        assert_eq!(replanned.partitions.len(), 3);
        replanned.verify_coverage(&a.paths()).unwrap();
    }

    #[test]
    fn test_replan_with_nothing_pushed_rebuilds_everything() {
        let a = analysis(
            vec![
                file("src/models/user.py", FileTag::DataAccess),
                file("src/models/order.py", FileTag::DataAccess),
            ],
            &[],
        );
        let current = plan(&a, "feature", "main").unwrap();
        let replanned = replan(&current, &a).unwrap();
        assert_eq!(replanned.partitions.len(), 1);
        assert_eq!(replanned.partitions[0].base, "main");
    }

    #[test]
    fn test_description_truncates_long_file_lists() {
        let files: BTreeSet<String> = (0..5).map(|i| format!("src/models/m{i}.py")).collect();
        let text = describe(FileTag::DataAccess, &files);
        assert!(text.starts_with("Data access: "));
        assert!(text.ends_with("and 2 more"));
    }
}
