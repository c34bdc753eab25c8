//! Domain-level error taxonomy for stacksmith.

/// stacksmith domain errors.
///
/// `Config` failures are fatal and raised before any mutation.
/// `ValidationFailure` is recoverable via exactly one bounded auto-fix
/// attempt. `PropagationConflict` is always fatal to the current run and
/// never auto-resolved. `Rollback` is surfaced while cleanup proceeds
/// best-effort.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation failed for partition '{partition}': checks [{}] did not pass", checks.join(", "))]
    ValidationFailure {
        partition: String,
        checks: Vec<String>,
    },

    #[error("propagation conflict at partition '{partition}': {reason}")]
    PropagationConflict { partition: String, reason: String },

    #[error("rollback error: {0}")]
    Rollback(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("check runner error: {0}")]
    Check(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for stacksmith domain operations.
pub type Result<T> = std::result::Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = StackError::Config("no changes between refs".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("no changes"));
    }

    #[test]
    fn test_validation_failure_names_checks() {
        let err = StackError::ValidationFailure {
            partition: "stack/02-interface".to_string(),
            checks: vec!["typecheck".to_string(), "test".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("stack/02-interface"));
        assert!(msg.contains("typecheck, test"));
    }

    #[test]
    fn test_propagation_conflict_display() {
        let err = StackError::PropagationConflict {
            partition: "stack/03-tests".to_string(),
            reason: "merge conflict in src/lib.rs".to_string(),
        };
        assert!(err.to_string().contains("stack/03-tests"));
        assert!(err.to_string().contains("merge conflict"));
    }

    #[test]
    fn test_digest_mismatch_display() {
        let err = StackError::DigestMismatch {
            expected: "abc".to_string(),
            actual: "def".to_string(),
        };
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("def"));
    }
}
