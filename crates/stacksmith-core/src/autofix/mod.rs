//! Bounded auto-repair for validation failures.
//!
//! Failures are classified into a closed taxonomy; only classified
//! failures with a recognizable artifact are ever acted on. The local
//! fixer repairs a partition mid-materialization with exactly one
//! retry. The remote fixer repairs an already-pushed partition and
//! propagates the change forward, halting at the first merge conflict.

pub mod classify;
pub mod index;
pub mod local;
pub mod remote;

pub use classify::{classify_failure, ClassifiedFailure};
pub use index::{ArtifactCandidate, ArtifactIndex};
pub use local::{attempt_local_fix, LocalFixOutcome};
pub use remote::{attempt_remote_fix, RemoteFixOutcome};
