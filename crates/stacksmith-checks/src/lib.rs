//! stacksmith validation gate.
//!
//! Discovers an ordered set of checks from a declarative definition file,
//! executes them against a materialized partition, and reports a joined
//! pass/fail verdict. Checks are read-only against the working tree and
//! safe to re-run.

pub mod check;
pub mod discover;
pub mod runner;
pub mod validate;

pub use check::{BuiltinCheck, CheckConfig};
pub use discover::{discover_checks, CheckFile, DEFAULT_CHECK_FILE};
pub use runner::{run_check, CheckOutcome};
pub use validate::{ValidationResult, Validator};
