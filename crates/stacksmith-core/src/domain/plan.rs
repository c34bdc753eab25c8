//! The ordered stack plan and its coverage invariant.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, StackError};
use crate::domain::partition::Partition;

/// Ordered list of partitions plus provenance metadata. Owned by the
/// orchestrator and persisted between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackPlan {
    /// Stable plan identifier.
    pub plan_id: String,

    /// Reference holding the full monolithic change.
    pub source_ref: String,

    /// Reference the stack is built on.
    pub base_ref: String,

    /// When the plan was created.
    pub created_at: DateTime<Utc>,

    /// Partitions in stack order.
    pub partitions: Vec<Partition>,
}

impl StackPlan {
    pub fn new(source_ref: impl Into<String>, base_ref: impl Into<String>) -> Self {
        let plan_id = format!(
            "stack-{}",
            uuid::Uuid::new_v4()
                .to_string()
                .split('-')
                .next()
                .unwrap_or("x")
        );
        Self {
            plan_id,
            source_ref: source_ref.into(),
            base_ref: base_ref.into(),
            created_at: Utc::now(),
            partitions: Vec::new(),
        }
    }

    /// Verify the file-coverage invariant: the union of all partitions'
    /// file sets equals `changeset` exactly, with no file owned twice.
    ///
    /// Runs before any partition is materialized; a mismatch is a fatal
    /// `Config` error naming the offending paths.
    pub fn verify_coverage(&self, changeset: &BTreeSet<String>) -> Result<()> {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for partition in &self.partitions {
            for path in &partition.files {
                *seen.entry(path.as_str()).or_default() += 1;
            }
        }

        let duplicated: Vec<&str> = seen
            .iter()
            .filter(|(_, &n)| n > 1)
            .map(|(&p, _)| p)
            .collect();
        let missing: Vec<&str> = changeset
            .iter()
            .filter(|p| !seen.contains_key(p.as_str()))
            .map(|p| p.as_str())
            .collect();
        let extraneous: Vec<&str> = seen
            .keys()
            .filter(|p| !changeset.contains(**p))
            .copied()
            .collect();

        if duplicated.is_empty() && missing.is_empty() && extraneous.is_empty() {
            return Ok(());
        }

        Err(StackError::Config(format!(
            "plan does not cover the changeset exactly: missing [{}], duplicated [{}], extraneous [{}]",
            missing.join(", "),
            duplicated.join(", "),
            extraneous.join(", "),
        )))
    }

    /// Index of the partition owning `path`.
    pub fn partition_index_of(&self, path: &str) -> Option<usize> {
        self.partitions
            .iter()
            .position(|p| p.files.contains(path))
    }

    /// Partition by name.
    pub fn partition_named(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// Index of the partition named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.partitions.iter().position(|p| p.name == name)
    }

    /// Length of the leading run of pushed partitions.
    pub fn pushed_prefix_len(&self) -> usize {
        self.partitions
            .iter()
            .take_while(|p| p.is_pushed())
            .count()
    }

    /// Branch point for partition `idx`: the previous partition's name,
    /// or the external base reference for the first partition.
    pub fn branch_point(&self, idx: usize) -> &str {
        if idx == 0 {
            &self.base_ref
        } else {
            &self.partitions[idx - 1].name
        }
    }

    /// All changed-file paths in the plan, in partition order.
    pub fn all_files(&self) -> BTreeSet<String> {
        self.partitions
            .iter()
            .flat_map(|p| p.files.iter().cloned())
            .collect()
    }
}
