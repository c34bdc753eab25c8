//! Change analysis: enumerate, classify, and graph the changeset.
//!
//! The analyzer reads the diff between a source reference and its base,
//! classifies every path through the ordered rule table, and extracts
//! import edges among the changed files only. Files outside the
//! changeset never enter the graph.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use crate::domain::changed_file::{classify_path, default_rules, ChangedFile, ChangeKind, ClassifyRule};
use crate::domain::error::{Result, StackError};
use crate::domain::graph::DependencyGraph;
use crate::vcs::{ChangeStatus, Vcs};

/// Output of the analysis stage: the classified changeset and its
/// dependency graph. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub files: Vec<ChangedFile>,
    pub graph: DependencyGraph,
}

impl Analysis {
    /// All changed paths.
    pub fn paths(&self) -> BTreeSet<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Builds an [`Analysis`] from a repository diff.
pub struct Analyzer {
    vcs: Arc<dyn Vcs>,
    rules: Vec<ClassifyRule>,
}

impl Analyzer {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        Self {
            vcs,
            rules: default_rules(),
        }
    }

    pub fn with_rules(vcs: Arc<dyn Vcs>, rules: Vec<ClassifyRule>) -> Self {
        Self { vcs, rules }
    }

    /// Analyze the changeset between `source_ref` and `base_ref`.
    ///
    /// An empty diff is a configuration error: there is nothing to
    /// split.
    pub fn analyze(&self, source_ref: &str, base_ref: &str) -> Result<Analysis> {
        let entries = self.vcs.changed_files(source_ref, base_ref)?;
        if entries.is_empty() {
            return Err(StackError::Config(format!(
                "no changes between {base_ref} and {source_ref}"
            )));
        }

        info!(
            source = %source_ref,
            base = %base_ref,
            files = entries.len(),
            "Analyzing changeset"
        );

        let changed_paths: BTreeSet<String> =
            entries.iter().map(|e| e.path.clone()).collect();

        let mut files = Vec::with_capacity(entries.len());
        let mut graph = DependencyGraph::new();
        for path in &changed_paths {
            graph.add_file(path.clone());
        }

        for entry in &entries {
            let kind = match entry.status {
                ChangeStatus::Added => ChangeKind::Added,
                ChangeStatus::Modified => ChangeKind::Modified,
                ChangeStatus::Deleted => ChangeKind::Deleted,
            };

            let content = if kind == ChangeKind::Deleted {
                None
            } else {
                self.vcs.read_file(source_ref, &entry.path)?
            };

            let lines = content
                .as_deref()
                .map(|c| c.lines().count() as u64)
                .unwrap_or(0);

            let mut imports = BTreeSet::new();
            if let Some(content) = &content {
                for identity in extract_imports(content) {
                    for target in resolve_targets(&identity, &changed_paths, &entry.path) {
                        graph.add_import(&entry.path, &target)?;
                        imports.insert(target);
                    }
                }
            }

            let tag = classify_path(&entry.path, &self.rules);
            debug!(path = %entry.path, tag = %tag.slug(), lines, "Classified file");

            files.push(ChangedFile {
                path: entry.path.clone(),
                tag,
                kind,
                lines,
                imports,
            });
        }

        info!(
            files = graph.file_count(),
            edges = graph.edge_count(),
            "Analysis complete"
        );

        Ok(Analysis { files, graph })
    }
}

/// Import identities mentioned in a file, as written in the source.
fn extract_imports(content: &str) -> Vec<String> {
    // One pattern per import style. Built per call; analysis runs once
    // per pipeline so compilation cost is irrelevant.
    let patterns = [
        // Rust
        r"(?m)^\s*(?:pub\s+)?use\s+([A-Za-z_][A-Za-z0-9_:]*)",
        r"(?m)^\s*(?:pub\s+)?mod\s+([A-Za-z_][A-Za-z0-9_]*)\s*;",
        // Python
        r"(?m)^\s*import\s+([A-Za-z_][A-Za-z0-9_.]*)",
        r"(?m)^\s*from\s+([A-Za-z_.][A-Za-z0-9_.]*)\s+import",
        // JavaScript / TypeScript
        r#"(?m)require\(\s*['"]([^'"]+)['"]\s*\)"#,
        r#"(?m)^\s*import\s+[^'"]*from\s+['"]([^'"]+)['"]"#,
        r#"(?m)^\s*import\s+['"]([^'"]+)['"]"#,
    ];

    let mut out = Vec::new();
    for pattern in patterns {
        let re = Regex::new(pattern).unwrap_or_else(|_| unreachable!("static pattern"));
        for caps in re.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                out.push(m.as_str().to_string());
            }
        }
    }
    out
}

/// Resolve an import identity to changed-file paths.
///
/// The identity is normalized to a path fragment (`::` and `.`
/// separators become `/`) and matched against extension-stripped
/// changeset paths by contiguous segment windows, longest window first.
/// That lets `crate::store::orders::Order` land on `src/store/orders.rs`
/// and `src.models.user` on `src/models/user.py`. The importing file
/// itself never matches.
fn resolve_targets(
    identity: &str,
    changed_paths: &BTreeSet<String>,
    self_path: &str,
) -> Vec<String> {
    let normalized = identity
        .trim_start_matches("./")
        .trim_start_matches("../")
        .replace("::", "/")
        .replace('.', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Vec::new();
    }

    for window in (1..=segments.len()).rev() {
        for start in 0..=(segments.len() - window) {
            let fragment = segments[start..start + window].join("/");
            let matches: Vec<String> = changed_paths
                .iter()
                .filter(|p| p.as_str() != self_path)
                .filter(|p| {
                    let stripped = strip_extension(p);
                    stripped == fragment || stripped.ends_with(&format!("/{fragment}"))
                })
                .cloned()
                .collect();
            if !matches.is_empty() {
                return matches;
            }
        }
    }
    Vec::new()
}

fn strip_extension(path: &str) -> &str {
    path.rsplit_once('.')
        .map(|(head, _)| head)
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryVcs;

    fn analyzer_for(files: &[(&str, &str)]) -> Analyzer {
        let vcs = MemoryVcs::new("main");
        vcs.seed_branch("feature", "main", files);
        Analyzer::new(Arc::new(vcs))
    }

    #[test]
    fn test_empty_changeset_is_an_error() {
        let vcs = MemoryVcs::new("main");
        vcs.create_branch("feature", "main").unwrap();
        let analyzer = Analyzer::new(Arc::new(vcs));
        let err = analyzer.analyze("feature", "main").unwrap_err();
        assert!(matches!(err, StackError::Config(_)));
    }

    #[test]
    fn test_classifies_and_counts_lines() {
        let analyzer = analyzer_for(&[
            ("src/models/user.py", "class User:\n    pass\n"),
            ("src/services/billing.py", "x = 1\n"),
        ]);
        let analysis = analyzer.analyze("feature", "main").unwrap();

        let user = analysis
            .files
            .iter()
            .find(|f| f.path == "src/models/user.py")
            .unwrap();
        assert_eq!(user.lines, 2);
        assert_eq!(user.kind, ChangeKind::Added);
        assert_eq!(user.tag, crate::domain::changed_file::FileTag::DataAccess);
    }

    #[test]
    fn test_deleted_file_has_zero_lines_and_no_imports() {
        let vcs = MemoryVcs::new("main");
        vcs.seed_branch("seeded", "main", &[("old.py", "import sys\nx = 1\n")]);
        vcs.checkout("seeded").unwrap();
        vcs.create_branch("feature", "seeded").unwrap();
        vcs.checkout("feature").unwrap();
        vcs.remove_file("old.py").unwrap();
        vcs.commit_all("drop old").unwrap();

        let analyzer = Analyzer::new(Arc::new(vcs));
        let analysis = analyzer.analyze("feature", "seeded").unwrap();
        let old = &analysis.files[0];
        assert_eq!(old.kind, ChangeKind::Deleted);
        assert_eq!(old.lines, 0);
        assert!(old.imports.is_empty());
    }

    #[test]
    fn test_python_imports_resolve_within_changeset() {
        let analyzer = analyzer_for(&[
            ("src/models/user.py", "class User:\n    pass\n"),
            (
                "src/services/billing.py",
                "from src.models.user import User\n",
            ),
        ]);
        let analysis = analyzer.analyze("feature", "main").unwrap();
        assert!(analysis
            .graph
            .has_edge("src/services/billing.py", "src/models/user.py"));
    }

    #[test]
    fn test_js_relative_import_resolves() {
        let analyzer = analyzer_for(&[
            ("web/api/routes.js", "import { user } from './user';\n"),
            ("web/api/user.js", "export const user = 1;\n"),
        ]);
        let analysis = analyzer.analyze("feature", "main").unwrap();
        assert!(analysis.graph.has_edge("web/api/routes.js", "web/api/user.js"));
    }

    #[test]
    fn test_rust_use_resolves_through_module_path() {
        let analyzer = analyzer_for(&[
            ("src/store/orders.rs", "pub struct Order;\n"),
            ("src/api/handler.rs", "use crate::store::orders::Order;\n"),
        ]);
        let analysis = analyzer.analyze("feature", "main").unwrap();
        assert!(analysis
            .graph
            .has_edge("src/api/handler.rs", "src/store/orders.rs"));
    }

    #[test]
    fn test_external_imports_produce_no_edges() {
        let analyzer = analyzer_for(&[(
            "src/services/billing.py",
            "import os\nimport requests\n",
        )]);
        let analysis = analyzer.analyze("feature", "main").unwrap();
        assert_eq!(analysis.graph.edge_count(), 0);
    }

    #[test]
    fn test_paths_helper_covers_all_files() {
        let analyzer = analyzer_for(&[("a.py", "x\n"), ("b.py", "y\n")]);
        let analysis = analyzer.analyze("feature", "main").unwrap();
        assert_eq!(
            analysis.paths(),
            ["a.py", "b.py"].iter().map(|s| s.to_string()).collect()
        );
    }
}
