//! Domain types for the stack-splitting pipeline.

pub mod changed_file;
pub mod error;
pub mod fix;
pub mod graph;
pub mod partition;
pub mod plan;
pub mod quality;
pub mod session;

pub use changed_file::{classify_path, default_rules, ChangeKind, ChangedFile, ClassifyRule, FileTag};
pub use error::{Result, StackError};
pub use fix::{FailureClass, FixRecord, FixScope};
pub use graph::{DependencyGraph, GraphComponent};
pub use partition::{Partition, PartitionStatus, ValidationAnnotation};
pub use plan::StackPlan;
pub use quality::{QualityFlag, QualityFinding, SizeClass, StackAudit};
pub use session::{PipelineStage, Session};
