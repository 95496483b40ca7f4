//! Stack listing and change detection.
//!
//! [`Manager`] walks the stacks of a loaded project and decides which of
//! them changed relative to a git base reference. A stack is considered
//! changed when any of the following holds:
//!
//! - a file inside the stack directory changed (or a parent stack encloses
//!   the changed file);
//! - a trigger file for the stack was added or modified;
//! - one of the stack's watched files changed;
//! - a local Terraform module the stack depends on, directly or through
//!   other local modules, changed.
//!
//! The module dependency check is a recursive walk over `module.source`
//! references with a visited set for cycle protection; directory listings
//! along the way are non-recursive, recursion happens only through module
//! references.

pub mod dag;
pub mod trigger;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{Root, Stack};
use crate::error::TerrastackError;
use crate::git::Git;
use crate::project::{ProjectPath, prj_abs_path};
use crate::tf::{self, Module};

/// The stacks manager.
pub struct Manager {
    root: Root,
    /// The git reference changes are computed against.
    git_base_ref: String,
}

/// The report of a project's stacks and the result of its default checks.
#[derive(Debug, Serialize)]
pub struct Report {
    pub stacks: Vec<Entry>,
    pub checks: RepoChecks,
}

/// Repository cleanliness info reported alongside stack listings.
#[derive(Debug, Default, Serialize)]
pub struct RepoChecks {
    pub untracked_files: Vec<String>,
    pub uncommitted_files: Vec<String>,
}

/// A stack entry result.
#[derive(Debug, Serialize)]
pub struct Entry {
    pub stack: Stack,
    /// Why this entry was returned; empty for plain listings.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl Manager {
    pub fn new(root: Root, git_base_ref: impl Into<String>) -> Self {
        Self {
            root,
            git_base_ref: git_base_ref.into(),
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Lists every stack of the project, lexicographically sorted by
    /// directory. When the project root is a git repository the report
    /// also carries the repository cleanliness checks.
    pub async fn list(&self) -> Result<Report> {
        debug!("listing stacks");

        let mut report = Report {
            stacks: self
                .root
                .stacks()
                .map(|stack| Entry {
                    stack: stack.clone(),
                    reason: String::new(),
                })
                .collect(),
            checks: RepoChecks::default(),
        };

        let git = Git::new(self.root.host_dir());
        if !git.is_repository().await {
            return Ok(report);
        }

        report.checks = check_repo_is_clean(&git).await.context("listing stacks error")?;
        Ok(report)
    }

    /// Lists the stacks that changed relative to the configured base
    /// reference. The project root must be inside a git repository.
    pub async fn list_changed(&self) -> Result<Report> {
        debug!(base_ref = %self.git_base_ref, "listing changed stacks");

        let git = Git::new(self.root.host_dir());
        if !git.is_repository().await {
            return Err(anyhow!(TerrastackError::NotARepository {
                path: self.root.host_dir().to_path_buf(),
            })
            .context("listing changed stacks error"));
        }

        let checks = check_repo_is_clean(&git)
            .await
            .context("listing changed stacks error")?;

        let changed_files = list_changed_files(self.root.host_dir(), &self.git_base_ref)
            .await
            .context("listing changed stacks error")?;

        let mut stack_set: BTreeMap<ProjectPath, Entry> = BTreeMap::new();

        for path in &changed_files {
            let abspath = self.root.host_dir().join(path);
            let projpath = prj_abs_path(self.root.host_dir(), &abspath);
            let triggered = trigger::stack_path(&projpath);

            if path.starts_with('.') && triggered.is_none() {
                trace!(%projpath, "ignoring changed file starting with .");
                continue;
            }

            if let Some(trigger_dir) = triggered {
                debug!(%projpath, stack = %trigger_dir, "trigger file change detected");

                match tokio::fs::metadata(&abspath).await {
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        debug!(%projpath, "ignoring deleted trigger file");
                        continue;
                    }
                    _ => {}
                }

                let Some(stack) = self.root.lookup(&trigger_dir) else {
                    debug!(%trigger_dir, "trigger path is not a stack, nothing to do");
                    continue;
                };

                stack_set.entry(stack.dir.clone()).or_insert_with(|| Entry {
                    stack: stack.clone(),
                    reason: format!("stack has been triggered by: {projpath}"),
                });
                continue;
            }

            let dirname = abspath
                .parent()
                .unwrap_or_else(|| self.root.host_dir())
                .to_path_buf();
            let cfgpath = prj_abs_path(self.root.host_dir(), &dirname);
            let Some(stack) = self.root.stack_of(&cfgpath) else {
                trace!(%cfgpath, "changed file is not part of any stack");
                continue;
            };

            stack_set.entry(stack.dir.clone()).or_insert_with(|| Entry {
                stack: stack.clone(),
                reason: "stack has unmerged changes".to_string(),
            });
        }

        for stack in self.root.stacks() {
            if stack_set.contains_key(&stack.dir) {
                continue;
            }

            if let Some(watch_file) = has_changed_watched_files(stack, &changed_files) {
                debug!(stack = %stack.dir, watch = %watch_file, "watched file changed");

                let mut stack = stack.clone();
                stack.is_changed = true;
                stack_set.insert(
                    stack.dir.clone(),
                    Entry {
                        reason: format!(
                            "stack changed because watched file {:?} changed",
                            watch_file.as_str()
                        ),
                        stack,
                    },
                );
                continue;
            }

            'tf_files: for tfpath in tf_files(&stack.host_dir).await? {
                trace!(stack = %stack.dir, file = %tfpath.display(), "parsing modules");

                let modules = tf::parse_modules(&tfpath).context("listing changed stacks error")?;
                for module in modules {
                    let mut visited = HashSet::new();
                    let (changed, why) = self
                        .module_changed(&module, &stack.host_dir, &mut visited)
                        .await
                        .with_context(|| format!("checking module {:?}", module.source))?;

                    if changed {
                        debug!(stack = %stack.dir, module = %module.source, "module changed");

                        let mut stack = stack.clone();
                        stack.is_changed = true;
                        stack_set.insert(
                            stack.dir.clone(),
                            Entry {
                                reason: format!(
                                    "stack changed because {:?} changed because {}",
                                    module.source, why
                                ),
                                stack,
                            },
                        );
                        break 'tf_files;
                    }
                }
            }
        }

        Ok(Report {
            checks,
            stacks: stack_set.into_values().collect(),
        })
    }

    /// Recursively checks whether the module or any local module it uses
    /// has changed. All `.tf` files of the module directory are parsed and
    /// their module references followed; `visited` keeps the walk from
    /// looping on cyclic references.
    async fn module_changed(
        &self,
        module: &Module,
        basedir: &Path,
        visited: &mut HashSet<String>,
    ) -> Result<(bool, String)> {
        if visited.contains(&module.source) {
            return Ok((false, String::new()));
        }

        if !module.is_local() {
            // remote sources (registry, VCS, S3, ...) are assumed unchanged
            return Ok((false, String::new()));
        }

        let mod_path = basedir.join(&module.source);

        let is_dir = tokio::fs::metadata(&mod_path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(TerrastackError::ModuleNotDirectory { path: mod_path }.into());
        }

        let changed_files = list_changed_files(&mod_path, &self.git_base_ref)
            .await
            .with_context(|| format!("listing changes in the module {:?}", module.source))?;

        if !changed_files.is_empty() {
            return Ok((
                true,
                format!("module {:?} has unmerged changes", module.source),
            ));
        }

        visited.insert(module.source.clone());

        let mut changed = false;
        let mut why = String::new();

        'tf_files: for tfpath in tf_files(&mod_path).await? {
            let modules = tf::parse_modules(&tfpath)
                .with_context(|| format!("parsing module {:?}", module.source))?;

            for child in modules {
                let (child_changed, reason) =
                    Box::pin(self.module_changed(&child, &mod_path, visited)).await?;

                if child_changed {
                    trace!(module = %module.source, child = %child.source, "module changed");
                    changed = true;
                    why = format!("{why}{} changed because {reason} ", module.source);
                    break 'tf_files;
                }
            }
        }

        Ok((
            changed,
            format!("module {:?} changed because {why}", module.source),
        ))
    }
}

/// Lists the non-directory `.tf` entries directly inside `dir`, sorted by
/// name. The listing never recurses into subdirectories.
async fn tf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(TerrastackError::Io)
        .with_context(|| format!("listing files of directory {dir:?}"))?;

    let mut files = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(TerrastackError::Io)
        .with_context(|| format!("listing files of directory {dir:?}"))?
    {
        let path = entry.path();
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        if is_file && path.extension().is_some_and(|ext| ext == tf::TERRAFORM_EXT) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Lists all files below `dir` that changed between the base reference and
/// `HEAD`. Returns an empty list when both resolve to the same commit.
async fn list_changed_files(dir: &Path, git_base_ref: &str) -> Result<Vec<String>> {
    let metadata = tokio::fs::metadata(dir)
        .await
        .with_context(|| format!("stat failed on {dir:?}"))?;
    if !metadata.is_dir() {
        return Err(TerrastackError::NotADirectory {
            path: dir.to_path_buf(),
        }
        .into());
    }

    let git = Git::new(dir);

    let base_ref = git
        .rev_parse(git_base_ref)
        .await
        .with_context(|| format!("getting revision {git_base_ref:?}"))?;
    let head_ref = git.rev_parse("HEAD").await.context("getting HEAD revision")?;

    if base_ref == head_ref {
        return Ok(Vec::new());
    }

    git.diff_names(&base_ref, &head_ref).await
}

fn has_changed_watched_files<'a>(
    stack: &'a Stack,
    changed_files: &[String],
) -> Option<&'a ProjectPath> {
    stack.watch.iter().find(|watch| {
        changed_files
            .iter()
            .any(|changed| changed.as_str() == watch.rel())
    })
}

async fn check_repo_is_clean(git: &Git) -> Result<RepoChecks> {
    Ok(RepoChecks {
        untracked_files: git.list_untracked().await.context("listing untracked files")?,
        uncommitted_files: git
            .list_uncommitted()
            .await
            .context("listing uncommitted files")?,
    })
}
