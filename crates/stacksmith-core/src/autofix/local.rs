//! Local auto-fix: one bounded repair attempt during materialization.

use chrono::Utc;
use tracing::{info, warn};

use crate::autofix::classify::classify_failure;
use crate::autofix::index::ArtifactIndex;
use crate::domain::error::Result;
use crate::domain::fix::{FixRecord, FixScope};
use crate::domain::plan::StackPlan;
use crate::validator::PartitionValidator;
use crate::vcs::Vcs;
use stacksmith_checks::ValidationResult;

/// Outcome of a local fix attempt. `revalidation` is `None` when no fix
/// was applied: the failure was outside the taxonomy or the artifact
/// could not be located.
#[derive(Debug)]
pub struct LocalFixOutcome {
    pub record: FixRecord,
    pub revalidation: Option<ValidationResult>,
}

impl LocalFixOutcome {
    /// Whether the fix was applied and the partition now validates.
    pub fn repaired(&self) -> bool {
        self.revalidation
            .as_ref()
            .map(|r| r.passed())
            .unwrap_or(false)
    }
}

/// Attempt exactly one repair of the partition at `idx`.
///
/// The partition's branch must be checked out. The resolving artifact
/// is searched for in the original source first, then in upstream
/// partitions nearest-first; a located artifact is copied in, committed,
/// and the partition re-validated once. There is no second attempt.
pub async fn attempt_local_fix(
    vcs: &dyn Vcs,
    validator: &dyn PartitionValidator,
    plan: &StackPlan,
    idx: usize,
    failure_log: &str,
) -> Result<LocalFixOutcome> {
    let partition = &plan.partitions[idx];
    let classified = classify_failure(failure_log);

    if !classified.actionable() {
        warn!(
            partition = %partition.name,
            class = ?classified.class,
            "Failure is not auto-fixable"
        );
        return Ok(LocalFixOutcome {
            record: FixRecord::unresolved(
                classified.class,
                classified.artifact.unwrap_or_else(|| "unclassified".to_string()),
            ),
            revalidation: None,
        });
    }
    let artifact = classified
        .artifact
        .clone()
        .unwrap_or_default();

    let mut index = ArtifactIndex::new();
    let mut source_files = plan.all_files();
    for path in &partition.files {
        source_files.remove(path);
    }
    index.add_scope(FixScope::OriginalSource, plan.source_ref.clone(), source_files);
    for upstream in plan.partitions[..idx].iter().rev() {
        index.add_scope(
            FixScope::UpstreamPartition,
            upstream.name.clone(),
            upstream.files.clone(),
        );
    }

    let Some(candidate) = index.find(&artifact) else {
        warn!(
            partition = %partition.name,
            artifact = %artifact,
            "No resolving artifact found"
        );
        return Ok(LocalFixOutcome {
            record: FixRecord::unresolved(classified.class, artifact),
            revalidation: None,
        });
    };

    info!(
        partition = %partition.name,
        artifact = %artifact,
        path = %candidate.path,
        from = %candidate.location,
        "Applying local fix"
    );
    vcs.checkout_file_from(&candidate.location, &candidate.path)?;
    vcs.commit_all(&format!(
        "Backfill {} from {}",
        candidate.path, candidate.location
    ))?;

    let revalidation = validator.validate(&partition.name).await?;

    Ok(LocalFixOutcome {
        record: FixRecord {
            failure_class: classified.class,
            artifact,
            scope: Some(candidate.scope),
            found_in: Some(candidate.location),
            propagated: false,
            propagation_ok: None,
            applied_at: Utc::now(),
        },
        revalidation: Some(revalidation),
    })
}
