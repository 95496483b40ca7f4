//! Project configuration loading.
//!
//! A terrastack project is a directory tree containing `*.tm.hcl`
//! configuration files. A directory is a stack iff one of its
//! configuration files carries a `stack { }` block. `let { }` blocks next
//! to a `stack` block are fix-point evaluated before the stack attributes,
//! so attribute expressions can reference `let.*`; `globals { }` blocks at
//! the project root populate the `global` namespace visible to every
//! stack.

mod stack;

pub use stack::Stack;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hcl::value::Map;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::TerrastackError;
use crate::hcl::EvalContext;
use crate::lets;
use crate::project::{ProjectPath, SourceFile, prj_abs_path};

/// Extension of terrastack configuration files.
pub const CONFIG_EXT: &str = ".tm.hcl";

/// The loaded configuration of a whole project.
#[derive(Debug)]
pub struct Root {
    host_dir: PathBuf,
    globals: Map<String, hcl::Value>,
    stacks: BTreeMap<ProjectPath, Stack>,
}

impl Root {
    /// Loads the project rooted at the given directory, discovering every
    /// stack below it.
    ///
    /// Hidden directories (leading `.`) are not descended into; symlinks
    /// are not followed.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let host_dir = std::fs::canonicalize(dir.as_ref())
            .with_context(|| format!("resolving project root {:?}", dir.as_ref()))?;

        let globals = load_globals(&host_dir)?;

        let mut stacks = BTreeMap::new();
        let walker = WalkDir::new(&host_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
            });

        for entry in walker {
            let entry = entry.context("walking project tree")?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let dir_path = prj_abs_path(&host_dir, entry.path());
            if let Some(stack) = load_dir_stack(&host_dir, entry.path(), &dir_path, &globals)? {
                debug!(stack = %stack.dir, "stack found");
                stacks.insert(stack.dir.clone(), stack);
            }
        }

        Ok(Self {
            host_dir,
            globals,
            stacks,
        })
    }

    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    /// The evaluated project-wide globals.
    pub fn globals(&self) -> &Map<String, hcl::Value> {
        &self.globals
    }

    /// All stacks, ordered lexicographically by directory.
    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.values()
    }

    pub fn stack_count(&self) -> usize {
        self.stacks.len()
    }

    /// The stack at exactly the given directory.
    pub fn lookup(&self, dir: &ProjectPath) -> Option<&Stack> {
        self.stacks.get(dir)
    }

    /// The stack enclosing the given project path: the path itself or its
    /// nearest ancestor that is a stack.
    pub fn stack_of(&self, path: &ProjectPath) -> Option<&Stack> {
        let mut dir = path.clone();
        loop {
            if let Some(stack) = self.stacks.get(&dir) {
                return Some(stack);
            }
            if dir.is_root() {
                return None;
            }
            dir = dir.dirname();
        }
    }
}

/// Parses every configuration file directly inside `dir`, in file-name
/// order. Returns the parsed bodies paired with their source tracking.
fn parse_config_files(
    host_dir: &Path,
    dir: &Path,
) -> Result<Vec<(SourceFile, hcl_edit::structure::Body)>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(TerrastackError::Io)
        .with_context(|| format!("listing files of directory {dir:?}"))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(CONFIG_EXT))
        })
        .collect();
    files.sort();

    let mut parsed = Vec::with_capacity(files.len());
    for path in files {
        let text = std::fs::read_to_string(&path)
            .map_err(TerrastackError::Io)
            .with_context(|| format!("reading {path:?}"))?;
        let body = hcl_edit::parser::parse_body(&text).map_err(|err| {
            TerrastackError::HclParseError {
                path: path.clone(),
                reason: err.to_string(),
            }
        })?;
        let project_path = prj_abs_path(host_dir, &path);
        parsed.push((SourceFile::new(path, project_path, text), body));
    }
    Ok(parsed)
}

/// Loads the stack defined in `dir`, if any.
fn load_dir_stack(
    host_dir: &Path,
    dir: &Path,
    dir_path: &ProjectPath,
    globals: &Map<String, hcl::Value>,
) -> Result<Option<Stack>> {
    let parsed = parse_config_files(host_dir, dir)?;
    if parsed.is_empty() {
        return Ok(None);
    }

    let mut let_exprs = lets::Exprs::new();
    let mut stack_block = None;

    for (src, body) in &parsed {
        for block in body.blocks() {
            match block.ident.value().as_str() {
                "stack" => {
                    if stack_block.is_some() {
                        return Err(TerrastackError::DuplicateStack {
                            dir: dir_path.clone(),
                        }
                        .into());
                    }
                    stack_block = Some((block, src));
                }
                "let" => let_exprs.merge(lets::load(block, src)?)?,
                "globals" => {
                    if !dir_path.is_root() {
                        warn!(
                            file = %src.project_path,
                            "globals block outside the project root is ignored"
                        );
                    }
                }
                other => {
                    return Err(TerrastackError::HclParseError {
                        path: src.host_path.clone(),
                        reason: format!("unrecognized block {other}"),
                    }
                    .into());
                }
            }
        }
    }

    let Some((block, src)) = stack_block else {
        return Ok(None);
    };

    let mut ctx = stack_eval_context(host_dir, globals, dir_path);
    let lets_map = let_exprs
        .eval(&mut ctx)
        .with_context(|| format!("evaluating lets of stack {dir_path}"))?;
    debug!(stack = %dir_path, lets = lets_map.len(), "lets evaluated");

    Stack::from_block(dir_path.clone(), dir.to_path_buf(), block, src, &ctx).map(Some)
}

/// Evaluates the `globals` blocks of the project root into the value map
/// published as the `global` namespace.
fn load_globals(host_dir: &Path) -> Result<Map<String, hcl::Value>> {
    let parsed = parse_config_files(host_dir, host_dir)?;

    let mut exprs = lets::Exprs::new();
    for (src, body) in &parsed {
        for block in body.blocks() {
            if block.ident.value().as_str() == "globals" {
                exprs.merge(lets::load(block, src)?)?;
            }
        }
    }

    let mut ctx = EvalContext::new();
    ctx.set_namespace("terramate", terramate_namespace(host_dir, None));
    let globals = exprs
        .eval_namespace(&mut ctx, "global")
        .context("evaluating project globals")?;
    Ok(globals.attributes())
}

/// The evaluation context a stack's configuration is evaluated in:
/// project metadata under `terramate`, project globals under `global`.
fn stack_eval_context(
    host_dir: &Path,
    globals: &Map<String, hcl::Value>,
    dir: &ProjectPath,
) -> EvalContext {
    let mut ctx = EvalContext::new();
    ctx.set_namespace("terramate", terramate_namespace(host_dir, Some(dir)));
    ctx.set_namespace("global", globals.clone());
    ctx
}

fn terramate_namespace(host_dir: &Path, stack_dir: Option<&ProjectPath>) -> Map<String, hcl::Value> {
    let mut ns = Map::new();

    let mut root = Map::new();
    root.insert(
        "path".to_string(),
        hcl::Value::from(host_dir.to_string_lossy().into_owned()),
    );
    ns.insert("root".to_string(), hcl::Value::Object(root));

    if let Some(dir) = stack_dir {
        let mut stack = Map::new();
        stack.insert("path".to_string(), hcl::Value::from(dir.as_str()));
        let name = if dir.is_root() { "/" } else { dir.basename() };
        stack.insert("name".to_string(), hcl::Value::from(name));
        ns.insert("stack".to_string(), hcl::Value::Object(stack));
    }

    ns
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn discovers_stacks_sorted_by_directory() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b/stack.tm.hcl", "stack {\n}\n");
        write(dir.path(), "a/stack.tm.hcl", "stack {\n  name = \"alpha\"\n}\n");
        write(dir.path(), "not-a-stack/notes.txt", "nothing here\n");

        let root = Root::load(dir.path()).unwrap();
        let dirs: Vec<_> = root.stacks().map(|s| s.dir.as_str().to_string()).collect();
        assert_eq!(dirs, vec!["/a", "/b"]);
        assert_eq!(root.lookup(&ProjectPath::new("/a")).unwrap().name, "alpha");
        assert_eq!(root.lookup(&ProjectPath::new("/b")).unwrap().name, "b");
    }

    #[test]
    fn stack_of_walks_parents() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "s1/stack.tm.hcl", "stack {\n}\n");
        std::fs::create_dir_all(dir.path().join("s1/sub/deep")).unwrap();

        let root = Root::load(dir.path()).unwrap();
        let found = root.stack_of(&ProjectPath::new("/s1/sub/deep")).unwrap();
        assert_eq!(found.dir.as_str(), "/s1");
        assert!(root.stack_of(&ProjectPath::new("/elsewhere")).is_none());
    }

    #[test]
    fn hidden_directories_are_not_descended() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".hidden/stack.tm.hcl", "stack {\n}\n");
        write(dir.path(), "visible/stack.tm.hcl", "stack {\n}\n");

        let root = Root::load(dir.path()).unwrap();
        let dirs: Vec<_> = root.stacks().map(|s| s.dir.as_str().to_string()).collect();
        assert_eq!(dirs, vec!["/visible"]);
    }

    #[test]
    fn lets_feed_stack_attributes() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "s1/stack.tm.hcl",
            "let {\n  env = \"prod\"\n  full = \"${let.env}-stack\"\n}\n\nstack {\n  name = let.full\n}\n",
        );

        let root = Root::load(dir.path()).unwrap();
        assert_eq!(root.lookup(&ProjectPath::new("/s1")).unwrap().name, "prod-stack");
    }

    #[test]
    fn globals_are_visible_to_stacks() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "project.tm.hcl", "globals {\n  team = \"platform\"\n}\n");
        write(
            dir.path(),
            "s1/stack.tm.hcl",
            "stack {\n  description = \"owned by ${global.team}\"\n}\n",
        );

        let root = Root::load(dir.path()).unwrap();
        assert_eq!(root.globals()["team"], hcl::Value::from("platform"));
        assert_eq!(
            root.lookup(&ProjectPath::new("/s1")).unwrap().description,
            "owned by platform"
        );
    }

    #[test]
    fn terramate_metadata_namespace_is_available() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "stacks/net/stack.tm.hcl",
            "stack {\n  description = \"stack ${terramate.stack.name} at ${terramate.stack.path}\"\n}\n",
        );

        let root = Root::load(dir.path()).unwrap();
        assert_eq!(
            root.lookup(&ProjectPath::new("/stacks/net")).unwrap().description,
            "stack net at /stacks/net"
        );
    }

    #[test]
    fn broken_lets_fail_the_load() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "s1/stack.tm.hcl",
            "let {\n  a = let.b\n  b = let.a\n}\n\nstack {\n}\n",
        );

        let err = Root::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("undefined let"));
    }

    #[test]
    fn duplicate_stack_blocks_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "s1/stack.tm.hcl", "stack {\n}\n");
        write(dir.path(), "s1/more.tm.hcl", "stack {\n}\n");

        assert!(Root::load(dir.path()).is_err());
    }
}
