//! Validation seam between the materializer and the check runner.

use async_trait::async_trait;

use crate::domain::error::{Result, StackError};
use stacksmith_checks::{ValidationResult, Validator};

/// Validates one materialized partition's working tree.
#[async_trait]
pub trait PartitionValidator: Send + Sync {
    async fn validate(&self, partition: &str) -> Result<ValidationResult>;
}

/// Production validator: runs the discovered check set in the
/// repository working tree.
pub struct CheckValidator {
    inner: Validator,
}

impl CheckValidator {
    pub fn new(inner: Validator) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PartitionValidator for CheckValidator {
    async fn validate(&self, partition: &str) -> Result<ValidationResult> {
        self.inner
            .validate(partition)
            .await
            .map_err(|e| StackError::Check(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacksmith_checks::CheckConfig;

    #[tokio::test]
    async fn test_check_validator_bridges_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let checks = vec![CheckConfig::custom(
            "probe".to_string(),
            vec!["true".to_string()],
            60,
        )];
        let validator = CheckValidator::new(Validator::new(checks, dir.path()));

        let result = validator.validate("part-1").await.unwrap();
        assert!(result.passed());
        assert_eq!(result.partition, "part-1");
    }
}
