//! Quality findings produced by the read-only stack audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Size classification of a partition by lines changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    TooSmall,
    Ideal,
    Large,
    TooLarge,
}

impl SizeClass {
    /// Classify a line count: too-small <40, ideal 40-300, large
    /// 300-500, too-large >500.
    pub fn classify(lines: u64) -> Self {
        match lines {
            0..=39 => SizeClass::TooSmall,
            40..=300 => SizeClass::Ideal,
            301..=500 => SizeClass::Large,
            _ => SizeClass::TooLarge,
        }
    }
}

/// Per-partition quality flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    TooSmall,
    TooLarge,
    MissingPairedTests,
    NonAdjacentDependency,
    WeakDescription,
}

/// Findings for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFinding {
    pub partition: String,
    pub size_class: SizeClass,
    pub flags: Vec<QualityFlag>,
    /// Human-readable details, one per flag.
    pub notes: Vec<String>,
}

/// Aggregate audit over a fully materialized stack. Never mutates the
/// plan it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackAudit {
    pub plan_id: String,
    pub findings: Vec<QualityFinding>,
    /// Aggregate score, 0-100.
    pub score: u8,
    pub evaluated_at: DateTime<Utc>,
}

impl StackAudit {
    /// Whether any partition carries a given flag.
    pub fn has_flag(&self, flag: QualityFlag) -> bool {
        self.findings.iter().any(|f| f.flags.contains(&flag))
    }

    /// Partitions flagged too-small, in stack order.
    pub fn too_small_partitions(&self) -> Vec<&str> {
        self.findings
            .iter()
            .filter(|f| f.flags.contains(&QualityFlag::TooSmall))
            .map(|f| f.partition.as_str())
            .collect()
    }
}
