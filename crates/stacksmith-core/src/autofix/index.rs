//! Artifact lookup across fix scopes.
//!
//! An index is an ordered list of scopes, each a reference plus the
//! file paths owned there. Lookup walks scopes in order and returns the
//! first path matching the artifact identity, so search priority is
//! encoded by construction: the local fixer indexes the original source
//! before upstream partitions, the remote fixer indexes downstream
//! partitions only.

use std::collections::BTreeSet;

use crate::domain::fix::FixScope;

/// One searchable scope: a reference and the files present there.
#[derive(Debug, Clone)]
struct ScopeEntry {
    scope: FixScope,
    location: String,
    files: BTreeSet<String>,
}

/// A located artifact: which scope, which reference, which path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    pub scope: FixScope,
    pub location: String,
    pub path: String,
}

/// Ordered artifact search space.
#[derive(Debug, Clone, Default)]
pub struct ArtifactIndex {
    scopes: Vec<ScopeEntry>,
}

impl ArtifactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scope. Earlier scopes win ties.
    pub fn add_scope(
        &mut self,
        scope: FixScope,
        location: impl Into<String>,
        files: BTreeSet<String>,
    ) {
        self.scopes.push(ScopeEntry {
            scope,
            location: location.into(),
            files,
        });
    }

    /// Find the first path matching an artifact identity.
    ///
    /// Identities are matched the same way imports resolve: normalized
    /// separator-wise and compared against extension-stripped path
    /// suffixes, with a bare stem match as fallback.
    pub fn find(&self, identity: &str) -> Option<ArtifactCandidate> {
        for entry in &self.scopes {
            if let Some(path) = match_in(identity, &entry.files) {
                return Some(ArtifactCandidate {
                    scope: entry.scope,
                    location: entry.location.clone(),
                    path,
                });
            }
        }
        None
    }
}

fn match_in(identity: &str, files: &BTreeSet<String>) -> Option<String> {
    let normalized = identity
        .trim_start_matches("./")
        .trim_start_matches("../")
        .replace("::", "/")
        .replace('.', "/");
    let normalized = normalized.trim_matches('/');
    if normalized.is_empty() {
        return None;
    }

    // Exact paths first (fixture messages carry real paths).
    if files.contains(identity) {
        return Some(identity.to_string());
    }

    let suffix = files
        .iter()
        .find(|p| {
            let stripped = strip_extension(p);
            stripped == normalized || stripped.ends_with(&format!("/{normalized}"))
        })
        .cloned();
    if suffix.is_some() {
        return suffix;
    }

    // Symbol identities match the defining file by stem.
    let stem = normalized.rsplit('/').next()?;
    files
        .iter()
        .find(|p| {
            strip_extension(p)
                .rsplit('/')
                .next()
                .map(|s| s.eq_ignore_ascii_case(stem))
                .unwrap_or(false)
        })
        .cloned()
}

fn strip_extension(path: &str) -> &str {
    path.rsplit_once('.')
        .map(|(head, _)| head)
        .unwrap_or(path)
}
