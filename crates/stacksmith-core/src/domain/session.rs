//! Pipeline session and the checkpointed stage machine.
//!
//! The session is the process-wide pipeline state: current stage, the
//! stack plan, and an immutable backup reference captured before any
//! mutation. Stage transitions produce a new snapshot rather than
//! mutating shared state in place; the document is read-modify-written
//! only at stage boundaries, never concurrently from two stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, StackError};
use crate::domain::plan::StackPlan;

/// Orchestrator stages. Bracketed stages in the flow are conditional:
/// `Analyze → Plan → Materialize → [Replan] → QualityAudit →
/// RemoteMonitor → [RemoteFix] → [Consolidate] → Report`, with
/// terminals `Done` and `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Analyze,
    Plan,
    Materialize,
    Replan,
    QualityAudit,
    RemoteMonitor,
    RemoteFix,
    Consolidate,
    Report,
    Done,
    Aborted,
}

impl PipelineStage {
    /// Legal forward transitions. `Aborted` is reachable from any
    /// non-terminal stage and is handled separately in [`Session::abort`].
    pub fn allowed_next(self) -> &'static [PipelineStage] {
        use PipelineStage::*;
        match self {
            Analyze => &[Plan],
            Plan => &[Materialize],
            Materialize => &[Replan, QualityAudit],
            Replan => &[Materialize],
            QualityAudit => &[RemoteMonitor, Consolidate, Report],
            RemoteMonitor => &[RemoteFix, Consolidate, Report],
            RemoteFix => &[RemoteMonitor, Consolidate, Report],
            Consolidate => &[Report],
            Report => &[Done],
            Done | Aborted => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Aborted)
    }
}

/// Process-wide pipeline state, persisted between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable session identifier.
    pub session_id: String,

    /// Current stage.
    pub stage: PipelineStage,

    /// The stack plan, once planning has run.
    pub plan: Option<StackPlan>,

    /// Immutable reference to the pre-pipeline state. Never mutated
    /// once created; every failure path leaves it untouched.
    pub backup_ref: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session at the `Analyze` stage with its backup reference.
    pub fn new(backup_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: format!(
                "session-{}",
                uuid::Uuid::new_v4()
                    .to_string()
                    .split('-')
                    .next()
                    .unwrap_or("x")
            ),
            stage: PipelineStage::Analyze,
            plan: None,
            backup_ref: backup_ref.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Produce the next session snapshot at stage `next`.
    ///
    /// Rejects transitions outside [`PipelineStage::allowed_next`]. The
    /// backup reference is carried over unchanged.
    pub fn advance(&self, next: PipelineStage) -> Result<Session> {
        if !self.stage.allowed_next().contains(&next) {
            return Err(StackError::Config(format!(
                "illegal stage transition {:?} -> {:?}",
                self.stage, next
            )));
        }
        let mut snapshot = self.clone();
        snapshot.stage = next;
        snapshot.updated_at = Utc::now();
        Ok(snapshot)
    }

    /// Produce an aborted snapshot. Legal from any non-terminal stage.
    pub fn abort(&self) -> Result<Session> {
        if self.stage.is_terminal() {
            return Err(StackError::Config(format!(
                "cannot abort from terminal stage {:?}",
                self.stage
            )));
        }
        let mut snapshot = self.clone();
        snapshot.stage = PipelineStage::Aborted;
        snapshot.updated_at = Utc::now();
        Ok(snapshot)
    }

    /// Replace the plan in a new snapshot.
    pub fn with_plan(&self, plan: StackPlan) -> Session {
        let mut snapshot = self.clone();
        snapshot.plan = Some(plan);
        snapshot.updated_at = Utc::now();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_at_analyze() {
        let session = Session::new("backup/pre-split");
        assert_eq!(session.stage, PipelineStage::Analyze);
        assert_eq!(session.backup_ref, "backup/pre-split");
        assert!(session.plan.is_none());
    }

    #[test]
    fn test_advance_returns_new_snapshot() {
        let session = Session::new("backup/pre-split");
        let next = session.advance(PipelineStage::Plan).unwrap();
        // Original is untouched.
        assert_eq!(session.stage, PipelineStage::Analyze);
        assert_eq!(next.stage, PipelineStage::Plan);
        assert_eq!(next.backup_ref, session.backup_ref);
    }

    #[test]
    fn test_advance_rejects_skipping_stages() {
        let session = Session::new("backup/pre-split");
        assert!(session.advance(PipelineStage::Materialize).is_err());
        assert!(session.advance(PipelineStage::Done).is_err());
    }

    #[test]
    fn test_full_happy_path() {
        let mut session = Session::new("backup/pre-split");
        for stage in [
            PipelineStage::Plan,
            PipelineStage::Materialize,
            PipelineStage::QualityAudit,
            PipelineStage::RemoteMonitor,
            PipelineStage::Report,
            PipelineStage::Done,
        ] {
            session = session.advance(stage).unwrap();
        }
        assert!(session.stage.is_terminal());
    }

    #[test]
    fn test_replan_loops_back_to_materialize() {
        let session = Session::new("b");
        let session = session.advance(PipelineStage::Plan).unwrap();
        let session = session.advance(PipelineStage::Materialize).unwrap();
        let session = session.advance(PipelineStage::Replan).unwrap();
        let session = session.advance(PipelineStage::Materialize).unwrap();
        assert_eq!(session.stage, PipelineStage::Materialize);
    }

    #[test]
    fn test_abort_from_active_stage() {
        let session = Session::new("b").advance(PipelineStage::Plan).unwrap();
        let aborted = session.abort().unwrap();
        assert_eq!(aborted.stage, PipelineStage::Aborted);
        assert_eq!(aborted.backup_ref, "b");
    }

    #[test]
    fn test_abort_from_terminal_rejected() {
        let mut session = Session::new("b");
        session.stage = PipelineStage::Done;
        assert!(session.abort().is_err());
    }
}
