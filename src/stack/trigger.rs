//! Stack change triggers.
//!
//! A trigger is a file below `<stack>/.terramate/trigger/`; its presence
//! or modification marks the stack as changed even when no code changed.
//! Triggers are committed like any other file, so creating one and merging
//! it forces the stack through the next change-detection run.

use anyhow::{Context, Result};
use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;

use crate::config::Root;
use crate::error::TerrastackError;
use crate::project::ProjectPath;

const TRIGGER_DIR: &str = ".terramate";
const TRIGGER_SUBDIR: &str = "trigger";

/// Decodes the stack directory a trigger file targets.
///
/// Returns `Some(stack_dir)` iff the path follows the
/// `<stack>/.terramate/trigger/<file>` convention; the stack directory is
/// whatever precedes the `.terramate` component (the project root for a
/// top-level `.terramate/trigger/<file>`).
pub fn stack_path(path: &ProjectPath) -> Option<ProjectPath> {
    let components: Vec<&str> = path.rel().split('/').collect();
    let n = components.len();
    if n < 3 || components[n - 3] != TRIGGER_DIR || components[n - 2] != TRIGGER_SUBDIR {
        return None;
    }
    if components[..n - 3].is_empty() {
        Some(ProjectPath::root())
    } else {
        Some(ProjectPath::new(format!("/{}", components[..n - 3].join("/"))))
    }
}

/// Creates a trigger file for the given stack and returns its host path.
///
/// The file name carries the creation timestamp; the contents record when
/// and why the trigger was created, as HCL, for humans reading the diff.
pub async fn create(root: &Root, stack_dir: &ProjectPath, reason: &str) -> Result<PathBuf> {
    let stack = root.lookup(stack_dir).ok_or_else(|| TerrastackError::NotAStack {
        dir: stack_dir.clone(),
    })?;

    let dir = stack.host_dir.join(TRIGGER_DIR).join(TRIGGER_SUBDIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating trigger directory {dir:?}"))?;

    let now = Utc::now();
    let path = dir.join(format!("{}.tm.hcl", now.format("%Y-%m-%dT%H-%M-%S%.3fZ")));
    let contents = format!(
        "trigger {{\n  ctime  = {}\n  reason = {:?}\n}}\n",
        now.timestamp(),
        reason
    );
    tokio::fs::write(&path, contents)
        .await
        .with_context(|| format!("writing trigger file {path:?}"))?;

    debug!(stack = %stack_dir, path = %path.display(), "trigger created");
    Ok(path)
}
