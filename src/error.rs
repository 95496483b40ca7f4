//! Error handling for terrastack.
//!
//! Failures are represented by [`TerrastackError`], a strongly-typed enum
//! covering git, configuration, and evaluation errors. Call sites that can
//! fail for several independent reasons at once (most notably the `let`
//! fixpoint evaluator) accumulate into an [`ErrorList`] and surface it as a
//! single composite error.
//!
//! The CLI boundary uses [`anyhow`] for context chaining; the taxonomy
//! strings attached there (`"listing stacks error"`,
//! `"listing changed stacks error"`) mirror the coarse [`ErrorKind`]
//! classes of the typed variants.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::project::{ProjectPath, SourceRange};

/// The main error type for terrastack operations.
#[derive(Debug, Error)]
pub enum TerrastackError {
    /// Git executable could not be run at all.
    #[error("git is not installed or not in PATH")]
    GitNotFound,

    /// A git subcommand exited unsuccessfully.
    #[error("git {operation} failed: {stderr}")]
    GitCommandError { operation: String, stderr: String },

    /// An operation that requires a repository ran outside of one.
    #[error("path {path:?} is not a git repository")]
    NotARepository { path: PathBuf },

    /// A `.tm.hcl` configuration file failed to parse.
    #[error("parsing {path:?}: {reason}")]
    HclParseError { path: PathBuf, reason: String },

    /// A `.tf` file failed to parse or carries a malformed `module` block.
    #[error("parsing modules in {path:?}: {reason}")]
    TfParseError { path: PathBuf, reason: String },

    /// An expression references a namespace the context does not know.
    #[error("{range}: unknown variable namespace: {namespace}")]
    UnknownNamespace { namespace: String, range: SourceRange },

    /// Expression evaluation failed.
    #[error("{range}: evaluating {target}: {reason}")]
    Eval {
        target: String,
        reason: String,
        range: SourceRange,
    },

    /// A name remained unresolvable after the fixpoint terminated; either a
    /// dependency cycle or a reference to a name that was never defined.
    #[error("{range}: undefined {namespace} {name}")]
    Undefined {
        namespace: String,
        name: String,
        range: SourceRange,
    },

    /// A namespace was traversed with something other than an attribute
    /// access as the first step (e.g. `let[0]`).
    #[error("{range}: unexpected traversal on namespace {namespace}: expected attribute access")]
    UnexpectedTraversal { namespace: String, range: SourceRange },

    /// A `map` block label collides with an attribute of the same block.
    #[error("map label {label} conflicts with let.{label} attribute")]
    MapRedefined { label: String },

    /// The same name was bound twice while merging blocks.
    #[error("{name} redefined in {path:?}")]
    Redefined { name: String, path: PathBuf },

    /// A `stack` block attribute did not evaluate to the expected shape.
    #[error("invalid stack.{attr}: {reason}")]
    InvalidStackAttribute { attr: String, reason: String },

    /// More than one `stack` block was found for a single directory.
    #[error("stack {dir} defined more than once")]
    DuplicateStack { dir: ProjectPath },

    /// An operation targeted a directory that is not a stack.
    #[error("directory {dir} is not a stack")]
    NotAStack { dir: ProjectPath },

    /// A `module.source` path does not resolve to a directory.
    #[error("\"source\" path {path:?} is not a directory")]
    ModuleNotDirectory { path: PathBuf },

    /// A path expected to be a directory is not one.
    #[error("{path:?} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse failure classes, matching the error taxonomy of the original
/// tool. Used by tests and by the CLI when grouping diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LetsEval,
    LetsRedefined,
    Git,
    Config,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::LetsEval => "lets eval",
            ErrorKind::LetsRedefined => "lets redefined",
            ErrorKind::Git => "git error",
            ErrorKind::Config => "config error",
            ErrorKind::Io => "io error",
        })
    }
}

impl TerrastackError {
    pub fn kind(&self) -> ErrorKind {
        use TerrastackError::*;
        match self {
            UnknownNamespace { .. } | Eval { .. } | Undefined { .. } | UnexpectedTraversal { .. } => {
                ErrorKind::LetsEval
            }
            MapRedefined { .. } | Redefined { .. } => ErrorKind::LetsRedefined,
            GitNotFound | GitCommandError { .. } | NotARepository { .. } => ErrorKind::Git,
            HclParseError { .. }
            | TfParseError { .. }
            | InvalidStackAttribute { .. }
            | DuplicateStack { .. }
            | NotAStack { .. }
            | ModuleNotDirectory { .. }
            | NotADirectory { .. } => ErrorKind::Config,
            Io(_) => ErrorKind::Io,
        }
    }
}

/// A collection of independent errors reported as one.
///
/// The `let` evaluator keeps collecting failures across fixpoint iterations
/// instead of bailing on the first one, so a single run can report every
/// broken binding at once.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<TerrastackError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: TerrastackError) {
        self.errors.push(err);
    }

    pub fn extend(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TerrastackError> {
        self.errors.iter()
    }

    /// Returns `ok` when no error was collected, otherwise the list itself.
    pub fn into_result<T>(self, ok: T) -> Result<T, ErrorList> {
        if self.is_empty() { Ok(ok) } else { Err(self) }
    }
}

impl From<TerrastackError> for ErrorList {
    fn from(err: TerrastackError) -> Self {
        Self { errors: vec![err] }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
