//! Git operations wrapper.
//!
//! Terrastack shells out to the system `git` binary instead of embedding a
//! git implementation, the same approach Cargo takes with
//! `git-fetch-with-cli`: the system git honors the user's configuration,
//! credential helpers, and platform quirks without this crate having to.
//!
//! All operations run through [`tokio::process::Command`] and are awaited
//! strictly in program order; the wrapper holds no state besides the
//! working directory it runs commands in. Arguments are always passed as
//! separate parameters, never through a shell.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::process::Command;

use crate::error::TerrastackError;

/// A handle running git commands inside a fixed working directory.
#[derive(Debug, Clone)]
pub struct Git {
    path: PathBuf,
}

impl Git {
    /// Creates a handle for the given working directory. The directory is
    /// not validated; use [`is_repository`](Self::is_repository) to check.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the working directory is inside a git repository.
    pub async fn is_repository(&self) -> bool {
        let output = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(&self.path)
            .output()
            .await;
        matches!(output, Ok(out) if out.status.success())
    }

    /// Resolves a reference (branch, tag, `HEAD`, remote ref) to its commit
    /// hash.
    pub async fn rev_parse(&self, reference: &str) -> Result<String> {
        let output = self
            .run("rev-parse", &["rev-parse", "--verify", reference])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Lists the files that differ between two commits, relative to the
    /// working directory.
    ///
    /// `--relative` keeps the listing scoped: when the handle points at a
    /// subdirectory of the repository, only changes below that directory
    /// are reported. The change detector relies on this when probing
    /// individual module directories.
    pub async fn diff_names(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let output = self
            .run("diff", &["diff", "--name-only", "--relative", base, head])
            .await?;
        Ok(lines(&output.stdout))
    }

    /// Lists files that are not tracked by git and not ignored.
    pub async fn list_untracked(&self) -> Result<Vec<String>> {
        let output = self
            .run("ls-files", &["ls-files", "--others", "--exclude-standard"])
            .await?;
        Ok(lines(&output.stdout))
    }

    /// Lists tracked files with uncommitted modifications, staged or not.
    pub async fn list_uncommitted(&self) -> Result<Vec<String>> {
        let output = self
            .run("diff", &["diff", "--name-only", "--relative", "HEAD"])
            .await?;
        Ok(lines(&output.stdout))
    }

    async fn run(&self, operation: &str, args: &[&str]) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => TerrastackError::GitNotFound,
                _ => TerrastackError::Io(err),
            })
            .with_context(|| format!("failed to execute git {operation}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TerrastackError::GitCommandError {
                operation: operation.to_string(),
                stderr,
            }
            .into());
        }

        Ok(output)
    }
}

fn lines(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
