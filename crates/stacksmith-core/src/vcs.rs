//! Version-control collaborator trait.
//!
//! The pipeline treats version control as a set of primitive,
//! synchronous operations. [`crate::git::GitCli`] is the production
//! backend; [`crate::fakes::MemoryVcs`] backs unit tests.

use serde::{Deserialize, Serialize};

use crate::domain::error::Result;

/// Status of one path in a diff between two references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

/// One entry in a changed-file enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub status: ChangeStatus,
}

/// Outcome of a merge attempt. Conflicts are surfaced, never resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge committed cleanly.
    Clean,
    /// Merge hit conflicts on these paths; the working tree must be
    /// restored via [`Vcs::abort_merge`].
    Conflict { paths: Vec<String> },
}

/// Primitive version-control operations consumed by the pipeline.
pub trait Vcs: Send + Sync {
    /// Enumerate paths differing between `base` and `source`, each
    /// exactly once.
    fn changed_files(&self, source: &str, base: &str) -> Result<Vec<DiffEntry>>;

    /// Read a file's content at a reference. `None` when the path does
    /// not exist there.
    fn read_file(&self, reference: &str, path: &str) -> Result<Option<String>>;

    /// Create a branch at `from` without switching to it.
    fn create_branch(&self, name: &str, from: &str) -> Result<()>;

    /// Whether a branch exists.
    fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Switch the working tree to a reference.
    fn checkout(&self, reference: &str) -> Result<()>;

    /// Copy one file from a reference into the current working tree.
    fn checkout_file_from(&self, reference: &str, path: &str) -> Result<()>;

    /// Remove a file from the current working tree.
    fn remove_file(&self, path: &str) -> Result<()>;

    /// Stage everything and commit; returns the new commit id.
    fn commit_all(&self, message: &str) -> Result<String>;

    /// Merge `from` into the current branch.
    fn merge(&self, from: &str) -> Result<MergeOutcome>;

    /// Abandon an in-progress conflicted merge.
    fn abort_merge(&self) -> Result<()>;

    /// Expose a branch externally.
    fn push(&self, branch: &str) -> Result<()>;

    /// Delete a local branch.
    fn delete_branch(&self, name: &str) -> Result<()>;

    /// Resolve a reference to a commit id.
    fn rev_parse(&self, reference: &str) -> Result<String>;

    /// Hard-reset the current branch and working tree to a reference.
    fn reset_hard(&self, reference: &str) -> Result<()>;

    /// Total lines changed between two references (additions plus
    /// deletions).
    fn diff_lines(&self, from: &str, to: &str) -> Result<u64>;
}
