//! Git backend for the version-control collaborator trait.
//!
//! Shells out to `git` in a fixed repository directory. Every operation
//! is synchronous; failures carry the captured stderr.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::error::{Result, StackError};
use crate::vcs::{ChangeStatus, DiffEntry, MergeOutcome, Vcs};

/// `git` CLI implementation of [`Vcs`].
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
    remote: String,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: "origin".to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| StackError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StackError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

impl Vcs for GitCli {
    fn changed_files(&self, source: &str, base: &str) -> Result<Vec<DiffEntry>> {
        let raw = self.run(&["diff", "--name-status", base, source])?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            let mut parts = line.split('\t');
            let status = parts.next().unwrap_or("");
            let path = match parts.next_back() {
                Some(p) if !p.is_empty() => p.to_string(),
                _ => continue,
            };
            let status = match status.chars().next() {
                Some('A') => ChangeStatus::Added,
                Some('D') => ChangeStatus::Deleted,
                // Renames and copies surface as a modification of the
                // new path.
                _ => ChangeStatus::Modified,
            };
            entries.push(DiffEntry { path, status });
        }
        Ok(entries)
    }

    fn read_file(&self, reference: &str, path: &str) -> Result<Option<String>> {
        let output = Command::new("git")
            .args(["show", &format!("{reference}:{path}")])
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| StackError::Git(format!("failed to run git: {e}")))?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
        } else {
            Ok(None)
        }
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        self.run(&["branch", name, from]).map(|_| ())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{name}")])
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| StackError::Git(format!("failed to run git: {e}")))?;
        Ok(output.status.success())
    }

    fn checkout(&self, reference: &str) -> Result<()> {
        self.run(&["checkout", reference]).map(|_| ())
    }

    fn checkout_file_from(&self, reference: &str, path: &str) -> Result<()> {
        self.run(&["checkout", reference, "--", path]).map(|_| ())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        // The path may be deleted in the source but absent from the
        // current branch point; either way the tree ends without it.
        if self.repo_dir.join(path).exists() {
            self.run(&["rm", "-f", path]).map(|_| ())
        } else {
            Ok(())
        }
    }

    fn commit_all(&self, message: &str) -> Result<String> {
        self.run(&["add", "-A"])?;
        self.run(&["commit", "--allow-empty", "-m", message])?;
        self.rev_parse("HEAD")
    }

    fn merge(&self, from: &str) -> Result<MergeOutcome> {
        let output = Command::new("git")
            .args(["merge", "--no-edit", from])
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| StackError::Git(format!("failed to run git: {e}")))?;

        if output.status.success() {
            return Ok(MergeOutcome::Clean);
        }

        let conflicted = self.run(&["diff", "--name-only", "--diff-filter=U"])?;
        let paths: Vec<String> = conflicted.lines().map(|l| l.to_string()).collect();
        if paths.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StackError::Git(format!(
                "git merge {from} failed without conflicts: {}",
                stderr.trim()
            )));
        }
        Ok(MergeOutcome::Conflict { paths })
    }

    fn abort_merge(&self) -> Result<()> {
        self.run(&["merge", "--abort"]).map(|_| ())
    }

    fn push(&self, branch: &str) -> Result<()> {
        self.run(&["push", "-u", &self.remote, branch]).map(|_| ())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.run(&["branch", "-D", name]).map(|_| ())
    }

    fn rev_parse(&self, reference: &str) -> Result<String> {
        let sha = self.run(&["rev-parse", reference])?.trim().to_string();
        if sha.is_empty() {
            return Err(StackError::Git(format!(
                "git rev-parse {reference} returned empty output"
            )));
        }
        Ok(sha)
    }

    fn reset_hard(&self, reference: &str) -> Result<()> {
        self.run(&["reset", "--hard", reference]).map(|_| ())
    }

    fn diff_lines(&self, from: &str, to: &str) -> Result<u64> {
        let raw = self.run(&["diff", "--numstat", from, to])?;
        let mut total = 0u64;
        for line in raw.lines() {
            let mut parts = line.split_whitespace();
            // Binary files report "-"; count them as zero lines.
            let added = parts.next().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
            let removed = parts.next().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
            total += added + removed;
        }
        Ok(total)
    }
}
