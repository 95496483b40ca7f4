//! Terrastack - Terraform stack orchestration
//!
//! Terrastack discovers "stacks" (directories containing Terraform code
//! managed as a single deployable unit) inside a project, evaluates a
//! declarative configuration language layered on HCL, and reports which
//! stacks changed relative to a git base reference, so that downstream
//! tooling can operate only on the affected units.
//!
//! # Architecture Overview
//!
//! The crate is built around two subsystems:
//!
//! - **Configuration evaluation**: `*.tm.hcl` files define stacks, `let`
//!   bindings, and project globals. Expressions are evaluated against an
//!   [`hcl::EvalContext`] holding named namespaces (`let`, `global`,
//!   `terramate`); `let` and `globals` blocks are resolved by a fixpoint
//!   evaluator that handles forward references and reports cycles.
//! - **Change detection**: the stacks [`stack::Manager`] compares the
//!   working tree against a git base reference and combines direct file
//!   changes, watch-file declarations, trigger files, and transitive local
//!   Terraform module dependencies into a sorted change report.
//!
//! Git access goes through the system `git` binary (like Cargo's
//! `git-fetch-with-cli`); Terraform files are only inspected for their
//! `module` blocks, never evaluated.
//!
//! # Core Modules
//!
//! - [`config`] - Project tree walking, stack and globals loading
//! - [`lets`] - `let` block parsing and fixpoint evaluation
//! - [`hcl`] - Evaluation context and expression introspection
//! - [`stack`] - Stack listing, change detection, triggers, wants graph
//! - [`git`] - Async wrapper over the system git command
//! - [`tf`] - Terraform `module` block extraction
//! - [`project`] - Project-relative paths and source ranges
//! - [`error`] - Typed errors and composite error lists
//!
//! # Example
//!
//! ```rust,no_run
//! use terrastack::config::Root;
//! use terrastack::stack::Manager;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let root = Root::load(".")?;
//! let manager = Manager::new(root, "origin/main");
//!
//! let report = manager.list_changed().await?;
//! for entry in &report.stacks {
//!     println!("{}: {}", entry.stack.dir, entry.reason);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod hcl;
pub mod lets;
pub mod project;
pub mod stack;
pub mod tf;

// test_utils is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
