//! Pipeline orchestration: drives the stage machine end to end.
//!
//! The orchestrator owns the session, persists the plan document at
//! every stage boundary, and asks the checkpoint before each stage
//! transition. A declined checkpoint aborts the session cleanly; an
//! unrecoverable materialization failure rolls back every unpushed
//! branch and leaves the backup reference untouched.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::analyzer::{Analysis, Analyzer};
use crate::auditor::audit;
use crate::autofix::{attempt_remote_fix, RemoteFixOutcome};
use crate::consolidate::{consolidate, MergeNeighborPolicy};
use crate::domain::error::{Result, StackError};
use crate::domain::quality::QualityFlag;
use crate::domain::session::{PipelineStage, Session};
use crate::materializer::{MaterializeConfig, Materializer};
use crate::plan_doc::{read_plan_doc, write_plan_doc, AnalysisSummary, PlanDocument};
use crate::planner;
use crate::reporting::write_report;
use crate::validator::PartitionValidator;
use crate::vcs::Vcs;

/// Confirmation gate between stages.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    /// Whether the pipeline may advance from `from` to `to`.
    async fn confirm(&self, from: PipelineStage, to: PipelineStage) -> Result<bool>;
}

/// Checkpoint that approves every transition. Used by `--yes` runs and
/// tests.
pub struct AutoApprove;

#[async_trait]
impl Checkpoint for AutoApprove {
    async fn confirm(&self, _from: PipelineStage, _to: PipelineStage) -> Result<bool> {
        Ok(true)
    }
}

/// Orchestrator policy knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Reference holding the monolithic change.
    pub source_ref: String,

    /// Reference the stack is built on.
    pub base_ref: String,

    /// Where the plan document lives.
    pub doc_path: PathBuf,

    pub materialize: MaterializeConfig,

    /// Whether too-small partitions are merged after the audit.
    pub consolidate: bool,

    pub merge_policy: MergeNeighborPolicy,
}

/// Drives the pipeline: analyze, plan, materialize (with one replan on
/// failure), audit, optionally consolidate, report.
///
/// Remote monitoring is operator-driven: [`Orchestrator::remote_fix`]
/// acts on the persisted plan with a failure log supplied from outside
/// and does not move the stage machine.
pub struct Orchestrator {
    vcs: Arc<dyn Vcs>,
    validator: Arc<dyn PartitionValidator>,
    checkpoint: Arc<dyn Checkpoint>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        vcs: Arc<dyn Vcs>,
        validator: Arc<dyn PartitionValidator>,
        checkpoint: Arc<dyn Checkpoint>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            vcs,
            validator,
            checkpoint,
            config,
        }
    }

    /// Run the whole pipeline. Returns the terminal session snapshot.
    ///
    /// The source reference is pinned to its commit sha up front, so a
    /// symbolic ref like `HEAD` keeps meaning the original changeset
    /// even while the walk checks out partition branches.
    pub async fn run(&self) -> Result<Session> {
        let backup = self.vcs.rev_parse(&self.config.source_ref)?;
        let mut session = Session::new(backup.clone());
        info!(
            session = %session.session_id,
            source = %self.config.source_ref,
            base = %self.config.base_ref,
            "Pipeline started"
        );

        let analyzer = Analyzer::new(self.vcs.clone());
        let analysis = analyzer.analyze(&backup, &self.config.base_ref)?;
        let summary = AnalysisSummary::of(&analysis);
        self.persist(&session, Some(&summary), None)?;

        session = match self.advance(session, PipelineStage::Plan).await? {
            Some(s) => s,
            None => return self.aborted(),
        };
        let plan = planner::plan(&analysis, &backup, &self.config.base_ref)?;
        session = session.with_plan(plan);
        self.persist(&session, Some(&summary), None)?;

        session = match self.advance(session, PipelineStage::Materialize).await? {
            Some(s) => s,
            None => return self.aborted(),
        };
        session = match self.materialize_with_replan(session, &analysis, &summary).await? {
            Some(s) => s,
            None => return self.aborted(),
        };

        session = match self.advance(session, PipelineStage::QualityAudit).await? {
            Some(s) => s,
            None => return self.aborted(),
        };
        let plan = session
            .plan
            .as_ref()
            .ok_or_else(|| StackError::Config("session has no plan to audit".to_string()))?;
        let mut stack_audit = audit(plan, &analysis);
        self.persist(&session, Some(&summary), Some(&stack_audit))?;

        if self.config.consolidate && stack_audit.has_flag(QualityFlag::TooSmall) {
            session = match self.advance(session, PipelineStage::Consolidate).await? {
                Some(s) => s,
                None => return self.aborted(),
            };
            let mut plan = session
                .plan
                .clone()
                .ok_or_else(|| StackError::Config("session has no plan".to_string()))?;
            let outcome = consolidate(&mut plan, &stack_audit, self.config.merge_policy)?;
            if outcome.changed() {
                info!(merges = outcome.merges.len(), "Rebuilding consolidated suffix");
                let materializer = Materializer::new(
                    self.vcs.clone(),
                    self.validator.clone(),
                    self.config.materialize.clone(),
                );
                let walk = materializer.materialize(&mut plan).await?;
                if let Some(failed) = walk.failed {
                    self.rollback(&session)?;
                    let aborted = session.abort()?;
                    self.persist(&aborted, Some(&summary), Some(&stack_audit))?;
                    return Err(validation_error(&plan, &failed));
                }
                stack_audit = audit(&plan, &analysis);
            }
            session = session.with_plan(plan);
            self.persist(&session, Some(&summary), Some(&stack_audit))?;
        }

        session = match self.advance(session, PipelineStage::Report).await? {
            Some(s) => s,
            None => return self.aborted(),
        };
        let report_path = self.report_path();
        let doc = self.document(&session, Some(&summary), Some(&stack_audit));
        write_report(&report_path, &doc, Some(&stack_audit))?;
        info!(path = %report_path.display(), "Report written");

        session = match self.advance(session, PipelineStage::Done).await? {
            Some(s) => s,
            None => return self.aborted(),
        };
        self.persist(&session, Some(&summary), Some(&stack_audit))?;
        info!(session = %session.session_id, "Pipeline complete");
        Ok(session)
    }

    /// Materialize the plan, re-planning once after a halted walk.
    ///
    /// The replan detour is checkpointed like every other transition;
    /// `None` means the operator declined and the session was aborted.
    async fn materialize_with_replan(
        &self,
        mut session: Session,
        analysis: &Analysis,
        summary: &AnalysisSummary,
    ) -> Result<Option<Session>> {
        let materializer = Materializer::new(
            self.vcs.clone(),
            self.validator.clone(),
            self.config.materialize.clone(),
        );

        let mut plan = session
            .plan
            .clone()
            .ok_or_else(|| StackError::Config("session has no plan".to_string()))?;
        let outcome = materializer.materialize(&mut plan).await?;
        session = session.with_plan(plan.clone());
        self.persist(&session, Some(summary), None)?;

        let Some(first_failure) = outcome.failed else {
            return Ok(Some(session));
        };

        warn!(partition = %first_failure, "Materialization halted, re-planning remainder");
        session = match self.advance(session, PipelineStage::Replan).await? {
            Some(s) => s,
            None => return Ok(None),
        };
        let mut plan = planner::replan(&plan, analysis)?;
        session = session.with_plan(plan.clone());
        session = match self.advance(session, PipelineStage::Materialize).await? {
            Some(s) => s,
            None => return Ok(None),
        };
        self.persist(&session, Some(summary), None)?;

        let retry = materializer.materialize(&mut plan).await?;
        session = session.with_plan(plan.clone());
        self.persist(&session, Some(summary), None)?;

        if let Some(failed) = retry.failed {
            error!(partition = %failed, "Materialization failed twice, rolling back");
            self.rollback(&session)?;
            let aborted = session.abort()?;
            self.persist(&aborted, Some(summary), None)?;
            return Err(validation_error(&plan, &failed));
        }
        Ok(Some(session))
    }

    /// Repair a pushed partition from a remotely observed failure log.
    ///
    /// Loads the persisted plan, runs the remote fixer, and persists
    /// the updated fix history. Conflicted outcomes are returned for
    /// the operator; nothing is resolved automatically.
    pub async fn remote_fix(
        &self,
        partition: &str,
        failure_log: &str,
    ) -> Result<RemoteFixOutcome> {
        let mut doc = read_plan_doc(&self.config.doc_path)?;
        let plan = doc
            .session
            .plan
            .as_mut()
            .ok_or_else(|| StackError::Config("plan document has no plan".to_string()))?;
        let idx = plan.index_of(partition).ok_or_else(|| {
            StackError::Config(format!("unknown partition: {partition}"))
        })?;
        if !plan.partitions[idx].is_pushed() {
            return Err(StackError::Config(format!(
                "partition '{partition}' was never pushed"
            )));
        }

        let outcome = attempt_remote_fix(
            self.vcs.as_ref(),
            self.validator.as_ref(),
            plan,
            idx,
            failure_log,
        )
        .await?;

        let record = match &outcome {
            RemoteFixOutcome::NotApplicable { record } => record,
            RemoteFixOutcome::Repaired { record, .. } => record,
            RemoteFixOutcome::Conflicted { record, .. } => record,
        };
        plan.partitions[idx].fixes.push(record.clone());
        write_plan_doc(&self.config.doc_path, &doc)?;
        Ok(outcome)
    }

    /// Delete every unpushed partition branch and restore the source
    /// reference to its backup. Pushed partitions are never touched.
    ///
    /// Cleanup is best-effort: all branches are attempted and the
    /// collected failures surface as one rollback error.
    pub fn rollback(&self, session: &Session) -> Result<()> {
        let mut problems = Vec::new();

        if let Some(plan) = &session.plan {
            // Move off any partition branch before deleting it. The
            // plan's source is a pinned sha, so check out the
            // configured ref rather than detaching onto the commit.
            if let Err(e) = self.vcs.checkout(&self.config.source_ref) {
                problems.push(e.to_string());
            }
            for partition in plan.partitions.iter().filter(|p| !p.is_pushed()) {
                match self.vcs.branch_exists(&partition.name) {
                    Ok(true) => {
                        if let Err(e) = self.vcs.delete_branch(&partition.name) {
                            problems.push(format!("{}: {e}", partition.name));
                        }
                    }
                    Ok(false) => {}
                    Err(e) => problems.push(format!("{}: {e}", partition.name)),
                }
            }
            if let Err(e) = self.vcs.reset_hard(&session.backup_ref) {
                problems.push(e.to_string());
            }
        }

        if problems.is_empty() {
            info!("Rollback complete");
            Ok(())
        } else {
            Err(StackError::Rollback(problems.join("; ")))
        }
    }

    /// Where the markdown report is written.
    pub fn report_path(&self) -> PathBuf {
        self.config.doc_path.with_file_name("stack-summary.md")
    }

    fn document(
        &self,
        session: &Session,
        summary: Option<&AnalysisSummary>,
        stack_audit: Option<&crate::domain::quality::StackAudit>,
    ) -> PlanDocument {
        let mut doc = PlanDocument::new(session.clone());
        if let Some(summary) = summary {
            doc = doc.with_summary(summary.clone());
        }
        if let Some(stack_audit) = stack_audit {
            doc = doc.with_audit(stack_audit.clone());
        }
        doc
    }

    fn persist(
        &self,
        session: &Session,
        summary: Option<&AnalysisSummary>,
        stack_audit: Option<&crate::domain::quality::StackAudit>,
    ) -> Result<()> {
        write_plan_doc(
            &self.config.doc_path,
            &self.document(session, summary, stack_audit),
        )
    }

    /// Ask the checkpoint, then advance. `None` means the operator
    /// declined and the session was aborted, rolled back, and
    /// persisted. Any branches materialized but not pushed are gone
    /// after a decline.
    async fn advance(
        &self,
        session: Session,
        to: PipelineStage,
    ) -> Result<Option<Session>> {
        if !self.checkpoint.confirm(session.stage, to).await? {
            warn!(from = ?session.stage, to = ?to, "Checkpoint declined, aborting");
            let aborted = session.abort()?;
            if let Err(e) = self.rollback(&aborted) {
                warn!(error = %e, "Rollback after declined checkpoint reported problems");
            }
            self.persist(&aborted, None, None)?;
            return Ok(None);
        }
        Ok(Some(session.advance(to)?))
    }

    fn aborted(&self) -> Result<Session> {
        let doc = read_plan_doc(&self.config.doc_path)?;
        Ok(doc.session)
    }
}

fn validation_error(plan: &crate::domain::plan::StackPlan, failed: &str) -> StackError {
    let checks = plan
        .partition_named(failed)
        .and_then(|p| p.validation.as_ref())
        .map(|v| v.failed_checks.clone())
        .unwrap_or_default();
    StackError::ValidationFailure {
        partition: failed.to_string(),
        checks,
    }
}
