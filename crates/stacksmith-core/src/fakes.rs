//! In-memory fakes for backend traits (testing only).
//!
//! [`MemoryVcs`] satisfies the [`Vcs`] contract over an in-memory commit
//! graph with real merge-base semantics, so partition materialization,
//! merge propagation, and rollback can be exercised without a git
//! binary. [`ScriptedValidator`] returns pre-programmed validation
//! results in order.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::domain::error::{Result, StackError};
use crate::validator::PartitionValidator;
use crate::vcs::{ChangeStatus, DiffEntry, MergeOutcome, Vcs};
use stacksmith_checks::{CheckOutcome, ValidationResult};

type Tree = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct FakeCommit {
    tree: Tree,
    parents: Vec<String>,
    #[allow(dead_code)]
    message: String,
}

#[derive(Debug, Default)]
struct Inner {
    commits: HashMap<String, FakeCommit>,
    branches: BTreeMap<String, String>,
    head: String,
    worktree: Tree,
    pushed: BTreeSet<String>,
}

/// In-memory [`Vcs`] backed by a commit DAG.
#[derive(Debug, Default)]
pub struct MemoryVcs {
    inner: Mutex<Inner>,
}

impl MemoryVcs {
    /// Create a repository with an empty initial commit on `branch`.
    pub fn new(branch: &str) -> Self {
        let vcs = Self::default();
        {
            let mut inner = vcs.inner.lock().unwrap();
            let sha = store_commit(&mut inner, Tree::new(), Vec::new(), "initial");
            inner.branches.insert(branch.to_string(), sha);
            inner.head = branch.to_string();
            inner.worktree = Tree::new();
        }
        vcs
    }

    /// Commit a set of files as a new commit on `branch`, creating the
    /// branch from the current head commit of `from` when absent.
    pub fn seed_branch(&self, branch: &str, from: &str, files: &[(&str, &str)]) {
        let mut inner = self.inner.lock().unwrap();
        let parent = inner.branches[from].clone();
        let mut tree = inner.commits[&parent].tree.clone();
        for (path, content) in files {
            tree.insert(path.to_string(), content.to_string());
        }
        let sha = store_commit(&mut inner, tree, vec![parent], "seed");
        inner.branches.insert(branch.to_string(), sha);
    }

    /// Branches pushed so far.
    pub fn pushed_branches(&self) -> BTreeSet<String> {
        self.inner.lock().unwrap().pushed.clone()
    }

    /// Whether a branch currently exists.
    pub fn has_branch(&self, name: &str) -> bool {
        self.inner.lock().unwrap().branches.contains_key(name)
    }

    /// Current working-tree content of a path.
    pub fn worktree_file(&self, path: &str) -> Option<String> {
        self.inner.lock().unwrap().worktree.get(path).cloned()
    }

    fn resolve(inner: &Inner, reference: &str) -> Result<String> {
        if let Some(sha) = inner.branches.get(reference) {
            return Ok(sha.clone());
        }
        if inner.commits.contains_key(reference) {
            return Ok(reference.to_string());
        }
        Err(StackError::Git(format!("unknown reference: {reference}")))
    }

    fn tree_of(inner: &Inner, reference: &str) -> Result<Tree> {
        let sha = Self::resolve(inner, reference)?;
        Ok(inner.commits[&sha].tree.clone())
    }
}

fn store_commit(inner: &mut Inner, tree: Tree, parents: Vec<String>, message: &str) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in &tree {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(content.as_bytes());
    }
    for parent in &parents {
        hasher.update(parent.as_bytes());
    }
    hasher.update(message.as_bytes());
    hasher.update(inner.commits.len().to_string().as_bytes());
    let sha = hex::encode(hasher.finalize());
    inner.commits.insert(
        sha.clone(),
        FakeCommit {
            tree,
            parents,
            message: message.to_string(),
        },
    );
    sha
}

fn ancestors(inner: &Inner, sha: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([sha.to_string()]);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(commit) = inner.commits.get(&current) {
            for parent in &commit.parents {
                queue.push_back(parent.clone());
            }
        }
    }
    seen
}

/// First common ancestor in BFS order from `a`.
fn merge_base(inner: &Inner, a: &str, b: &str) -> Option<String> {
    let b_ancestors = ancestors(inner, b);
    let mut queue = VecDeque::from([a.to_string()]);
    let mut seen = BTreeSet::new();
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if b_ancestors.contains(&current) {
            return Some(current);
        }
        if let Some(commit) = inner.commits.get(&current) {
            for parent in &commit.parents {
                queue.push_back(parent.clone());
            }
        }
    }
    None
}

fn line_count(content: &str) -> u64 {
    content.lines().count() as u64
}

impl Vcs for MemoryVcs {
    fn changed_files(&self, source: &str, base: &str) -> Result<Vec<DiffEntry>> {
        let inner = self.inner.lock().unwrap();
        let source_tree = Self::tree_of(&inner, source)?;
        let base_tree = Self::tree_of(&inner, base)?;

        let mut paths: BTreeSet<&String> = source_tree.keys().collect();
        paths.extend(base_tree.keys());

        let mut entries = Vec::new();
        for path in paths {
            let status = match (base_tree.get(path), source_tree.get(path)) {
                (None, Some(_)) => ChangeStatus::Added,
                (Some(_), None) => ChangeStatus::Deleted,
                (Some(a), Some(b)) if a != b => ChangeStatus::Modified,
                _ => continue,
            };
            entries.push(DiffEntry {
                path: path.clone(),
                status,
            });
        }
        Ok(entries)
    }

    fn read_file(&self, reference: &str, path: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::tree_of(&inner, reference)?.get(path).cloned())
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let sha = Self::resolve(&inner, from)?;
        inner.branches.insert(name.to_string(), sha);
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().branches.contains_key(name))
    }

    fn checkout(&self, reference: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.branches.contains_key(reference) {
            return Err(StackError::Git(format!("unknown branch: {reference}")));
        }
        inner.head = reference.to_string();
        inner.worktree = Self::tree_of(&inner, reference)?;
        Ok(())
    }

    fn checkout_file_from(&self, reference: &str, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let content = Self::tree_of(&inner, reference)?
            .get(path)
            .cloned()
            .ok_or_else(|| StackError::Git(format!("{path} does not exist at {reference}")))?;
        inner.worktree.insert(path.to_string(), content);
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        self.inner.lock().unwrap().worktree.remove(path);
        Ok(())
    }

    fn commit_all(&self, message: &str) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.head.clone();
        let parent = inner.branches[&head].clone();
        let tree = inner.worktree.clone();
        let sha = store_commit(&mut inner, tree, vec![parent], message);
        inner.branches.insert(head, sha.clone());
        Ok(sha)
    }

    fn merge(&self, from: &str) -> Result<MergeOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.head.clone();
        let ours_sha = inner.branches[&head].clone();
        let theirs_sha = Self::resolve(&inner, from)?;

        let base_sha = merge_base(&inner, &ours_sha, &theirs_sha);
        let base_tree = base_sha
            .as_ref()
            .map(|sha| inner.commits[sha].tree.clone())
            .unwrap_or_default();
        let ours = inner.commits[&ours_sha].tree.clone();
        let theirs = inner.commits[&theirs_sha].tree.clone();

        let mut paths: BTreeSet<String> = ours.keys().cloned().collect();
        paths.extend(theirs.keys().cloned());
        paths.extend(base_tree.keys().cloned());

        let mut merged = Tree::new();
        let mut conflicts = Vec::new();
        for path in paths {
            let base = base_tree.get(&path);
            let our = ours.get(&path);
            let their = theirs.get(&path);
            let keep = match (our, their) {
                (Some(o), Some(t)) if o == t => Some(o.clone()),
                (Some(o), Some(t)) => {
                    if base == our {
                        Some(t.clone())
                    } else if base == their {
                        Some(o.clone())
                    } else {
                        conflicts.push(path.clone());
                        None
                    }
                }
                (Some(o), None) => {
                    if base == our {
                        // Deleted on theirs, unchanged on ours.
                        None
                    } else {
                        Some(o.clone())
                    }
                }
                (None, Some(t)) => {
                    if base == their {
                        None
                    } else {
                        Some(t.clone())
                    }
                }
                (None, None) => None,
            };
            if let Some(content) = keep {
                merged.insert(path, content);
            }
        }

        if !conflicts.is_empty() {
            // Nothing is committed; the worktree is left untouched.
            return Ok(MergeOutcome::Conflict { paths: conflicts });
        }

        let sha = store_commit(
            &mut inner,
            merged.clone(),
            vec![ours_sha, theirs_sha],
            &format!("merge {from}"),
        );
        inner.branches.insert(head, sha);
        inner.worktree = merged;
        Ok(MergeOutcome::Clean)
    }

    fn abort_merge(&self) -> Result<()> {
        // Conflicted merges never touch the fake's state.
        Ok(())
    }

    fn push(&self, branch: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.branches.contains_key(branch) {
            return Err(StackError::Git(format!("unknown branch: {branch}")));
        }
        inner.pushed.insert(branch.to_string());
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.head == name {
            return Err(StackError::Git(format!(
                "cannot delete checked-out branch {name}"
            )));
        }
        inner
            .branches
            .remove(name)
            .ok_or_else(|| StackError::Git(format!("unknown branch: {name}")))?;
        Ok(())
    }

    fn rev_parse(&self, reference: &str) -> Result<String> {
        let inner = self.inner.lock().unwrap();
        Self::resolve(&inner, reference)
    }

    fn reset_hard(&self, reference: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let sha = Self::resolve(&inner, reference)?;
        let head = inner.head.clone();
        let tree = inner.commits[&sha].tree.clone();
        inner.branches.insert(head, sha);
        inner.worktree = tree;
        Ok(())
    }

    fn diff_lines(&self, from: &str, to: &str) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        let from_tree = Self::tree_of(&inner, from)?;
        let to_tree = Self::tree_of(&inner, to)?;

        let mut paths: BTreeSet<&String> = from_tree.keys().collect();
        paths.extend(to_tree.keys());

        // Approximation: whole-file line counts, not a minimal diff.
        let mut total = 0u64;
        for path in paths {
            total += match (from_tree.get(path), to_tree.get(path)) {
                (None, Some(b)) => line_count(b),
                (Some(a), None) => line_count(a),
                (Some(a), Some(b)) if a != b => line_count(a).max(line_count(b)),
                _ => 0,
            };
        }
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// ScriptedValidator
// ---------------------------------------------------------------------------

/// Build a one-check [`ValidationResult`] for tests and scripting.
pub fn validation_result(partition: &str, passed: bool, log: &str) -> ValidationResult {
    ValidationResult {
        partition: partition.to_string(),
        outcomes: vec![CheckOutcome {
            name: "scripted".to_string(),
            exit_code: if passed { 0 } else { 1 },
            log: log.to_string(),
            duration_ms: 1,
            passed,
        }],
        started_at: Utc::now(),
        duration_ms: 1,
    }
}

/// Validator that replays scripted results per partition, falling back
/// to a passing result when the script is exhausted.
#[derive(Default)]
pub struct ScriptedValidator {
    scripts: Mutex<HashMap<String, VecDeque<ValidationResult>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    /// Validator that passes everything.
    pub fn passing() -> Self {
        Self::default()
    }

    /// Queue a result for one partition's next validation.
    pub fn script(&self, partition: &str, result: ValidationResult) {
        self.scripts
            .lock()
            .unwrap()
            .entry(partition.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queue a failure with the given log for one partition.
    pub fn script_failure(&self, partition: &str, log: &str) {
        self.script(partition, validation_result(partition, false, log));
    }

    /// Partitions validated so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PartitionValidator for ScriptedValidator {
    async fn validate(&self, partition: &str) -> Result<ValidationResult> {
        self.calls.lock().unwrap().push(partition.to_string());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(partition)
            .and_then(|queue| queue.pop_front());
        Ok(scripted.unwrap_or_else(|| validation_result(partition, true, "")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_and_diff() {
        let vcs = MemoryVcs::new("main");
        vcs.seed_branch("feature", "main", &[("a.txt", "a\n"), ("b.txt", "b\n")]);

        let entries = vcs.changed_files("feature", "main").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.status == ChangeStatus::Added));
    }

    #[test]
    fn test_branch_commit_and_read() {
        let vcs = MemoryVcs::new("main");
        vcs.create_branch("work", "main").unwrap();
        vcs.checkout("work").unwrap();
        vcs.inner
            .lock()
            .unwrap()
            .worktree
            .insert("f.txt".to_string(), "content\n".to_string());
        vcs.commit_all("add f").unwrap();

        assert_eq!(
            vcs.read_file("work", "f.txt").unwrap(),
            Some("content\n".to_string())
        );
        assert_eq!(vcs.read_file("main", "f.txt").unwrap(), None);
    }

    #[test]
    fn test_merge_fast_forward_like() {
        let vcs = MemoryVcs::new("main");
        vcs.seed_branch("feature", "main", &[("a.txt", "a\n")]);
        vcs.checkout("main").unwrap();
        assert_eq!(vcs.merge("feature").unwrap(), MergeOutcome::Clean);
        assert_eq!(
            vcs.read_file("main", "a.txt").unwrap(),
            Some("a\n".to_string())
        );
    }

    #[test]
    fn test_merge_conflict_on_divergent_edits() {
        let vcs = MemoryVcs::new("main");
        vcs.seed_branch("seeded", "main", &[("shared.txt", "base\n")]);
        vcs.checkout("seeded").unwrap();

        vcs.seed_branch("left", "seeded", &[("shared.txt", "left\n")]);
        vcs.seed_branch("right", "seeded", &[("shared.txt", "right\n")]);

        vcs.checkout("right").unwrap();
        match vcs.merge("left").unwrap() {
            MergeOutcome::Conflict { paths } => {
                assert_eq!(paths, vec!["shared.txt".to_string()])
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // Conflict leaves the branch untouched.
        assert_eq!(
            vcs.read_file("right", "shared.txt").unwrap(),
            Some("right\n".to_string())
        );
    }

    #[test]
    fn test_merge_takes_their_change_when_ours_unchanged() {
        let vcs = MemoryVcs::new("main");
        vcs.seed_branch("seeded", "main", &[("shared.txt", "base\n")]);
        vcs.seed_branch("fixed", "seeded", &[("shared.txt", "fixed\n")]);
        vcs.seed_branch("downstream", "seeded", &[("other.txt", "x\n")]);

        vcs.checkout("downstream").unwrap();
        assert_eq!(vcs.merge("fixed").unwrap(), MergeOutcome::Clean);
        assert_eq!(
            vcs.read_file("downstream", "shared.txt").unwrap(),
            Some("fixed\n".to_string())
        );
        assert_eq!(
            vcs.read_file("downstream", "other.txt").unwrap(),
            Some("x\n".to_string())
        );
    }

    #[test]
    fn test_push_and_delete() {
        let vcs = MemoryVcs::new("main");
        vcs.create_branch("out", "main").unwrap();
        vcs.push("out").unwrap();
        assert!(vcs.pushed_branches().contains("out"));

        vcs.delete_branch("out").unwrap();
        assert!(!vcs.has_branch("out"));
        // Pushed record survives branch deletion, like a remote would.
        assert!(vcs.pushed_branches().contains("out"));
    }

    #[tokio::test]
    async fn test_scripted_validator_replays_then_passes() {
        let validator = ScriptedValidator::passing();
        validator.script_failure("p1", "cannot find module x");

        let first = validator.validate("p1").await.unwrap();
        assert!(!first.passed());
        let second = validator.validate("p1").await.unwrap();
        assert!(second.passed());
        assert_eq!(validator.calls(), vec!["p1", "p1"]);
    }
}
