//! Auto-fix taxonomy and audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed failure taxonomy used by the auto-fixers. Failures outside
/// the taxonomy are never repaired automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    MissingReference,
    MissingFixture,
    UndefinedSymbol,
    Other,
}

impl FailureClass {
    /// Whether the auto-fixers may act on this class.
    pub fn is_fixable(self) -> bool {
        self != FailureClass::Other
    }
}

/// Where a resolving artifact was searched for or found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixScope {
    /// The original, unpartitioned source changeset.
    OriginalSource,
    /// An already-materialized partition earlier in the stack.
    UpstreamPartition,
    /// A partition later in the stack (remote auto-fix only).
    DownstreamPartition,
}

/// Outcome of one auto-fix attempt, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixRecord {
    /// Classified failure that triggered the fix.
    pub failure_class: FailureClass,

    /// Artifact identity derived from the failure message.
    pub artifact: String,

    /// Scope the resolving artifact was found in, if any.
    pub scope: Option<FixScope>,

    /// Location the artifact was copied from: a partition name or the
    /// source reference.
    pub found_in: Option<String>,

    /// Whether the fix required forward propagation.
    pub propagated: bool,

    /// Propagation outcome when it ran.
    pub propagation_ok: Option<bool>,

    /// When the attempt completed.
    pub applied_at: DateTime<Utc>,
}

impl FixRecord {
    /// Record for a failed search: nothing found, nothing applied.
    pub fn unresolved(failure_class: FailureClass, artifact: impl Into<String>) -> Self {
        Self {
            failure_class,
            artifact: artifact.into(),
            scope: None,
            found_in: None,
            propagated: false,
            propagation_ok: None,
            applied_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_is_not_fixable() {
        assert!(!FailureClass::Other.is_fixable());
        assert!(FailureClass::MissingReference.is_fixable());
        assert!(FailureClass::MissingFixture.is_fixable());
        assert!(FailureClass::UndefinedSymbol.is_fixable());
    }

    #[test]
    fn test_unresolved_record_has_no_location() {
        let record = FixRecord::unresolved(FailureClass::UndefinedSymbol, "parse_config");
        assert!(record.scope.is_none());
        assert!(record.found_in.is_none());
        assert!(!record.propagated);
    }

    #[test]
    fn test_fix_record_serde_roundtrip() {
        let record = FixRecord {
            failure_class: FailureClass::MissingReference,
            artifact: "billing/rates.py".to_string(),
            scope: Some(FixScope::OriginalSource),
            found_in: Some("feature-branch".to_string()),
            propagated: false,
            propagation_ok: None,
            applied_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).expect("serialize");
        let back: FixRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(record, back);
    }
}
