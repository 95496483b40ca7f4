//! Shared test utilities.
//!
//! [`GitSandbox`] builds throwaway git repositories for change-detection
//! tests by driving the real `git` binary, so tests exercise the same
//! plumbing the tool uses in production. Helpers panic on failure: a broken
//! sandbox is a test bug, not a condition to recover from.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// A temporary git repository with an initial commit on `main`.
pub struct GitSandbox {
    root: TempDir,
}

impl GitSandbox {
    /// Initializes a repository with deterministic identity configuration
    /// and a first commit, so `main` exists and diffs have a base.
    pub fn new() -> Self {
        let root = TempDir::new().expect("create sandbox dir");
        let sandbox = Self { root };

        sandbox.git(&["init", "--initial-branch", "main"]);
        sandbox.git(&["config", "user.name", "terrastack tests"]);
        sandbox.git(&["config", "user.email", "tests@terrastack.invalid"]);
        sandbox.git(&["config", "commit.gpgsign", "false"]);

        sandbox.write_file("README.md", "# sandbox\n");
        sandbox.commit_all("first commit");
        sandbox
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Writes a file below the sandbox root, creating parent directories.
    /// Returns the absolute path.
    pub fn write_file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, contents).expect("write file");
        path
    }

    pub fn remove_file(&self, rel: &str) {
        std::fs::remove_file(self.root.path().join(rel)).expect("remove file");
    }

    /// Stages everything and commits.
    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-m", message]);
    }

    /// Creates and checks out a new branch.
    pub fn checkout_new(&self, branch: &str) {
        self.git(&["checkout", "-b", branch]);
    }

    pub fn checkout(&self, branch: &str) {
        self.git(&["checkout", branch]);
    }

    fn git(&self, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.root.path())
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

impl Default for GitSandbox {
    fn default() -> Self {
        Self::new()
    }
}
