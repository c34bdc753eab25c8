//! stacksmith core library
//!
//! Splits a monolithic change into a dependency-ordered stack of
//! reviewable partitions, materializes each as a validated branch, and
//! audits the result. Re-exports the pipeline components for
//! programmatic access.

pub mod analyzer;
pub mod auditor;
pub mod autofix;
pub mod consolidate;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod materializer;
pub mod orchestrator;
pub mod plan_doc;
pub mod planner;
pub mod reporting;
pub mod telemetry;
pub mod validator;
pub mod vcs;

pub use analyzer::{Analysis, Analyzer};
pub use auditor::audit;
pub use autofix::{
    attempt_local_fix, attempt_remote_fix, classify_failure, ArtifactCandidate, ArtifactIndex,
    ClassifiedFailure, LocalFixOutcome, RemoteFixOutcome,
};
pub use consolidate::{consolidate, ConsolidateOutcome, ConsolidationMerge, MergeNeighborPolicy};
pub use domain::{
    classify_path, default_rules, ChangeKind, ChangedFile, ClassifyRule, DependencyGraph,
    FailureClass, FileTag, FixRecord, FixScope, GraphComponent, Partition, PartitionStatus,
    PipelineStage, QualityFinding, QualityFlag, Result, Session, SizeClass, StackAudit,
    StackError, StackPlan, ValidationAnnotation,
};
pub use git::{is_git_repo, GitCli};
pub use materializer::{MaterializeConfig, MaterializeOutcome, Materializer};
pub use orchestrator::{AutoApprove, Checkpoint, Orchestrator, OrchestratorConfig};
pub use plan_doc::{
    read_plan_doc, write_plan_doc, AnalysisSummary, PlanDocument, PLAN_DOC_FILE,
};
pub use planner::{plan, replan};
pub use reporting::{render_report, write_report};
pub use telemetry::init_tracing;
pub use validator::{CheckValidator, PartitionValidator};
pub use vcs::{ChangeStatus, DiffEntry, MergeOutcome, Vcs};

/// stacksmith version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
