//! Persisted pipeline state: a human-readable JSON document with a
//! digest sidecar.
//!
//! The document is written at stage boundaries and read back on resume.
//! The sidecar holds the SHA-256 of the document bytes; a mismatch on
//! read means the document was edited without updating the sidecar and
//! is rejected. Deliberate hand edits are supported by deleting the
//! sidecar, which skips verification for that read.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::analyzer::Analysis;
use crate::domain::error::{Result, StackError};
use crate::domain::quality::StackAudit;
use crate::domain::session::Session;

/// Default document file name, relative to the repository root.
pub const PLAN_DOC_FILE: &str = "stacksmith-plan.json";

/// Compact description of the analysis stage, kept for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub file_count: usize,
    pub edge_count: usize,
    /// Changed-file count per tag slug.
    pub tag_counts: BTreeMap<String, usize>,
}

impl AnalysisSummary {
    pub fn of(analysis: &Analysis) -> Self {
        let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
        for f in &analysis.files {
            *tag_counts.entry(f.tag.slug().to_string()).or_default() += 1;
        }
        Self {
            file_count: analysis.graph.file_count(),
            edge_count: analysis.graph.edge_count(),
            tag_counts,
        }
    }
}

/// The full persisted state: session (stage, plan, backup reference)
/// plus the analysis summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub session: Session,
    pub summary: Option<AnalysisSummary>,
    pub audit: Option<StackAudit>,
}

impl PlanDocument {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            summary: None,
            audit: None,
        }
    }

    pub fn with_summary(mut self, summary: AnalysisSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_audit(mut self, audit: StackAudit) -> Self {
        self.audit = Some(audit);
        self
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".digest");
    PathBuf::from(name)
}

fn digest_of(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write the document as pretty JSON and refresh its digest sidecar.
pub fn write_plan_doc(path: &Path, doc: &PlanDocument) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)?;
    fs::write(path, &json)?;
    fs::write(sidecar_path(path), digest_of(json.as_bytes()))?;
    info!(path = %path.display(), stage = ?doc.session.stage, "Wrote plan document");
    Ok(())
}

/// Read the document back, verifying the digest when the sidecar is
/// present.
pub fn read_plan_doc(path: &Path) -> Result<PlanDocument> {
    let bytes = fs::read(path)?;

    let sidecar = sidecar_path(path);
    match fs::read_to_string(&sidecar) {
        Ok(expected) => {
            let expected = expected.trim().to_string();
            let actual = digest_of(&bytes);
            if expected != actual {
                return Err(StackError::DigestMismatch { expected, actual });
            }
        }
        Err(_) => {
            debug!(path = %path.display(), "No digest sidecar, skipping verification");
        }
    }

    Ok(serde_json::from_slice(&bytes)?)
}
