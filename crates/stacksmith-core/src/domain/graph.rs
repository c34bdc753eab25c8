//! Intra-changeset dependency graph.
//!
//! Directed edges among changed files: `a → b` means a imports b. Built
//! once by the analyzer from the full changeset and never spans files
//! outside it.
//!
//! Ordering is computed over strongly-connected components so that
//! import cycles collapse into a single unit: the foundation-first
//! invariant only requires `index(partition(b)) <= index(partition(a))`,
//! so mutually-importing files may legally share a partition.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, StackError};

/// A group of changed files that must be ordered as one unit, together
/// with its dependency depth (0 = no intra-changeset dependencies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphComponent {
    /// Member paths, lexically sorted.
    pub files: Vec<String>,
    /// Longest dependency chain strictly below this component.
    pub level: usize,
}

/// Directed dependency graph over changed-file paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    /// `path → {paths it imports}` (upstream adjacency)
    imports: BTreeMap<String, BTreeSet<String>>,
    /// `path → {paths that import it}` (downstream adjacency)
    importers: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a changed-file node. Idempotent.
    pub fn add_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.nodes.insert(path.clone());
        self.imports.entry(path.clone()).or_default();
        self.importers.entry(path).or_default();
    }

    /// Add an import edge: `importer` imports `target`.
    ///
    /// Both paths must already be registered; edges never span files
    /// outside the changeset.
    pub fn add_import(&mut self, importer: &str, target: &str) -> Result<()> {
        if !self.nodes.contains(importer) {
            return Err(StackError::Config(format!(
                "import edge references unknown file: {importer}"
            )));
        }
        if !self.nodes.contains(target) {
            return Err(StackError::Config(format!(
                "import edge references unknown file: {target}"
            )));
        }
        if importer == target {
            return Ok(());
        }
        self.imports
            .entry(importer.to_string())
            .or_default()
            .insert(target.to_string());
        self.importers
            .entry(target.to_string())
            .or_default()
            .insert(importer.to_string());
        Ok(())
    }

    /// Number of registered files.
    pub fn file_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of import edges.
    pub fn edge_count(&self) -> usize {
        self.imports.values().map(|s| s.len()).sum()
    }

    /// Whether `importer` has a direct edge to `target`.
    pub fn has_edge(&self, importer: &str, target: &str) -> bool {
        self.imports
            .get(importer)
            .map(|s| s.contains(target))
            .unwrap_or(false)
    }

    /// Direct imports of `path`.
    pub fn imports_of(&self, path: &str) -> impl Iterator<Item = &String> {
        self.imports.get(path).into_iter().flatten()
    }

    /// Direct importers of `path`.
    pub fn importers_of(&self, path: &str) -> impl Iterator<Item = &String> {
        self.importers.get(path).into_iter().flatten()
    }

    /// All edges as `(importer, target)` pairs, lexically ordered.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (importer, targets) in &self.imports {
            for target in targets {
                out.push((importer.clone(), target.clone()));
            }
        }
        out
    }

    /// Strongly-connected components ordered foundation-first: every
    /// component appears after all components it imports. Deterministic —
    /// nodes and neighbors are visited in lexical order, and components
    /// at the same level sort by their lexically-smallest member.
    pub fn components(&self) -> Vec<GraphComponent> {
        let scc = self.tarjan_sccs();

        let mut comp_of: HashMap<&str, usize> = HashMap::new();
        for (idx, members) in scc.iter().enumerate() {
            for m in members {
                comp_of.insert(m.as_str(), idx);
            }
        }

        // Condensation: comp → set of comps it imports.
        let mut comp_deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); scc.len()];
        for (importer, targets) in &self.imports {
            let from = comp_of[importer.as_str()];
            for target in targets {
                let to = comp_of[target.as_str()];
                if from != to {
                    comp_deps[from].insert(to);
                }
            }
        }

        // Level = longest dependency chain below (condensation is acyclic).
        let mut levels: Vec<Option<usize>> = vec![None; scc.len()];
        fn level_of(idx: usize, deps: &[BTreeSet<usize>], levels: &mut Vec<Option<usize>>) -> usize {
            if let Some(l) = levels[idx] {
                return l;
            }
            let l = deps[idx]
                .iter()
                .map(|&d| level_of(d, deps, levels) + 1)
                .max()
                .unwrap_or(0);
            levels[idx] = Some(l);
            l
        }

        let mut out: Vec<GraphComponent> = scc
            .iter()
            .enumerate()
            .map(|(idx, members)| GraphComponent {
                files: members.clone(),
                level: level_of(idx, &comp_deps, &mut levels),
            })
            .collect();

        out.sort_by(|a, b| (a.level, &a.files[0]).cmp(&(b.level, &b.files[0])));
        out
    }

    /// Tarjan's algorithm over lexically-ordered nodes and neighbors.
    /// Member lists come out sorted.
    fn tarjan_sccs(&self) -> Vec<Vec<String>> {
        struct State<'a> {
            graph: &'a DependencyGraph,
            index: usize,
            indices: HashMap<&'a str, usize>,
            lowlinks: HashMap<&'a str, usize>,
            stack: Vec<&'a str>,
            on_stack: BTreeSet<&'a str>,
            sccs: Vec<Vec<String>>,
        }

        fn strongconnect<'a>(node: &'a str, st: &mut State<'a>) {
            st.indices.insert(node, st.index);
            st.lowlinks.insert(node, st.index);
            st.index += 1;
            st.stack.push(node);
            st.on_stack.insert(node);

            if let Some(targets) = st.graph.imports.get(node) {
                for target in targets {
                    let target = target.as_str();
                    if !st.indices.contains_key(target) {
                        strongconnect(target, st);
                        let low = st.lowlinks[target].min(st.lowlinks[node]);
                        st.lowlinks.insert(node, low);
                    } else if st.on_stack.contains(target) {
                        let low = st.indices[target].min(st.lowlinks[node]);
                        st.lowlinks.insert(node, low);
                    }
                }
            }

            if st.lowlinks[node] == st.indices[node] {
                let mut members = Vec::new();
                while let Some(top) = st.stack.pop() {
                    st.on_stack.remove(top);
                    members.push(top.to_string());
                    if top == node {
                        break;
                    }
                }
                members.sort();
                st.sccs.push(members);
            }
        }

        let mut st = State {
            graph: self,
            index: 0,
            indices: HashMap::new(),
            lowlinks: HashMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            sccs: Vec::new(),
        };

        for node in &self.nodes {
            if !st.indices.contains_key(node.as_str()) {
                strongconnect(node.as_str(), &mut st);
            }
        }

        st.sccs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> DependencyGraph {
        // s imports r, r imports m
        let mut g = DependencyGraph::new();
        g.add_file("m.py");
        g.add_file("r.py");
        g.add_file("s.py");
        g.add_import("r.py", "m.py").unwrap();
        g.add_import("s.py", "r.py").unwrap();
        g
    }

    #[test]
    fn test_components_are_foundation_first() {
        let comps = chain().components();
        let order: Vec<&str> = comps.iter().map(|c| c.files[0].as_str()).collect();
        assert_eq!(order, vec!["m.py", "r.py", "s.py"]);
        assert_eq!(comps[0].level, 0);
        assert_eq!(comps[1].level, 1);
        assert_eq!(comps[2].level, 2);
    }

    #[test]
    fn test_cycle_collapses_into_one_component() {
        let mut g = DependencyGraph::new();
        g.add_file("a.py");
        g.add_file("b.py");
        g.add_file("c.py");
        g.add_import("a.py", "b.py").unwrap();
        g.add_import("b.py", "a.py").unwrap();
        g.add_import("c.py", "a.py").unwrap();

        let comps = g.components();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].files, vec!["a.py", "b.py"]);
        assert_eq!(comps[1].files, vec!["c.py"]);
        assert!(comps[0].level < comps[1].level);
    }

    #[test]
    fn test_independent_files_share_level_zero() {
        let mut g = DependencyGraph::new();
        g.add_file("x.py");
        g.add_file("y.py");
        let comps = g.components();
        assert_eq!(comps.len(), 2);
        assert!(comps.iter().all(|c| c.level == 0));
        // Lexical tie-break.
        assert_eq!(comps[0].files[0], "x.py");
    }

    #[test]
    fn test_edge_rejects_unknown_file() {
        let mut g = DependencyGraph::new();
        g.add_file("known.py");
        let result = g.add_import("known.py", "outside-changeset.py");
        assert!(matches!(result, Err(StackError::Config(_))));
    }

    #[test]
    fn test_self_edge_is_ignored() {
        let mut g = DependencyGraph::new();
        g.add_file("a.py");
        g.add_import("a.py", "a.py").unwrap();
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_diamond_levels() {
        // d imports b and c; b and c import a
        let mut g = DependencyGraph::new();
        for p in ["a.py", "b.py", "c.py", "d.py"] {
            g.add_file(p);
        }
        g.add_import("b.py", "a.py").unwrap();
        g.add_import("c.py", "a.py").unwrap();
        g.add_import("d.py", "b.py").unwrap();
        g.add_import("d.py", "c.py").unwrap();

        let comps = g.components();
        let level = |path: &str| {
            comps
                .iter()
                .find(|c| c.files.contains(&path.to_string()))
                .unwrap()
                .level
        };
        assert_eq!(level("a.py"), 0);
        assert_eq!(level("b.py"), 1);
        assert_eq!(level("c.py"), 1);
        assert_eq!(level("d.py"), 2);
    }

    #[test]
    fn test_importers_inverse_of_imports() {
        let g = chain();
        let importers: Vec<&String> = g.importers_of("m.py").collect();
        assert_eq!(importers, vec!["r.py"]);
        assert!(g.has_edge("r.py", "m.py"));
        assert!(!g.has_edge("m.py", "r.py"));
    }
}
