//! Partitions: the ordered units of the stack.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, StackError};
use crate::domain::fix::FixRecord;

/// Lifecycle of a partition.
///
/// `Planned → Materialized → Validated → Pushed`, or `Failed` from any
/// non-pushed state. `Pushed` is reachable only from `Validated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Planned,
    Materialized,
    Validated,
    Pushed,
    Failed,
}

impl PartitionStatus {
    /// Whether a forward transition to `next` is legal.
    pub fn can_transition(self, next: PartitionStatus) -> bool {
        use PartitionStatus::*;
        matches!(
            (self, next),
            (Planned, Materialized)
                | (Materialized, Validated)
                | (Validated, Pushed)
                | (Planned, Failed)
                | (Materialized, Failed)
                | (Validated, Failed)
        )
    }
}

/// Compact validation outcome persisted in the plan document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationAnnotation {
    pub passed: bool,
    pub failed_checks: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// One ordered unit of the stack, materialized as a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    /// Branch name, unique within the plan.
    pub name: String,

    /// Predecessor partition name, or the external base reference for
    /// the first partition.
    pub base: String,

    /// Commit message.
    pub message: String,

    /// Exact set of changed-file paths owned by this partition.
    pub files: BTreeSet<String>,

    /// Current lifecycle status.
    pub status: PartitionStatus,

    /// Validation outcome, once validated.
    pub validation: Option<ValidationAnnotation>,

    /// Auto-fix attempts applied to this partition.
    pub fixes: Vec<FixRecord>,

    /// Lines changed versus the predecessor, measured at materialization.
    pub lines_changed: Option<u64>,

    /// Flagged when `lines_changed` is under the minimum threshold.
    pub too_small: bool,

    /// Set when the partition was pushed.
    pub pushed_at: Option<DateTime<Utc>>,
}

impl Partition {
    pub fn new(
        name: impl Into<String>,
        base: impl Into<String>,
        message: impl Into<String>,
        files: BTreeSet<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base: base.into(),
            message: message.into(),
            files,
            status: PartitionStatus::Planned,
            validation: None,
            fixes: Vec::new(),
            lines_changed: None,
            too_small: false,
            pushed_at: None,
        }
    }

    /// Apply a guarded forward transition.
    pub fn transition(&mut self, next: PartitionStatus) -> Result<()> {
        if !self.status.can_transition(next) {
            return Err(StackError::Config(format!(
                "partition '{}': illegal status transition {:?} -> {:?}",
                self.name, self.status, next
            )));
        }
        if next == PartitionStatus::Pushed {
            self.pushed_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }

    /// Reset to `Materialized` after a structural change (base re-point)
    /// so the partition must pass validation again before any push.
    pub fn require_revalidation(&mut self) {
        self.status = PartitionStatus::Materialized;
        self.validation = None;
    }

    pub fn is_pushed(&self) -> bool {
        self.status == PartitionStatus::Pushed
    }
}
