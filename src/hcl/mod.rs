//! Expression evaluation support on top of the `hcl` crate.
//!
//! [`eval::EvalContext`] layers named value namespaces (`let`, `global`,
//! `terramate`, ...) over [`hcl::eval::Context`]; [`vars`] enumerates the
//! free variable references of an expression so evaluators can reason
//! about dependencies before attempting evaluation.

pub mod eval;
pub mod vars;

pub use eval::EvalContext;
pub use vars::{Step, VarRef, expr_variables};
