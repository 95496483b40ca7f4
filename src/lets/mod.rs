//! Parsing and evaluation of `let` blocks.
//!
//! A `let` block binds names to expressions that may reference other
//! namespaces and each other, in any order:
//!
//! ```hcl
//! let {
//!     instances = let.base_count * 2
//!     base_count = 3
//!     map settings {
//!         region = "eu-west-1"
//!     }
//! }
//! ```
//!
//! Bindings are resolved by a fixpoint: expressions are evaluated in
//! passes, skipping any expression that still references a pending `let`
//! name, until a full pass makes no progress. This handles arbitrary
//! dependency order without needing a topological sort over the expression
//! graph, and reports cycles naturally as names that never resolve.
//!
//! The sentinel `name = unset` removes a binding; `map <name> { ... }`
//! sub-blocks bind an object value built from the block body.

use hcl::Identifier;
use hcl::value::Map;
use hcl_edit::Span;
use hcl_edit::structure::{Attribute, Block, Body};
use indexmap::IndexMap;
use tracing::trace;

use crate::error::{ErrorList, TerrastackError};
use crate::hcl::{EvalContext, Step, expr_variables};
use crate::project::{SourceFile, SourceRange};

/// An unevaluated let expression.
#[derive(Debug, Clone)]
pub struct Expr {
    /// Where the expression is defined.
    pub origin: SourceRange,
    pub expr: hcl::Expression,
}

/// The map of unevaluated let expressions visible in a directory.
#[derive(Debug, Default, Clone)]
pub struct Exprs(IndexMap<String, Expr>);

/// An evaluated let.
#[derive(Debug, Clone)]
pub struct Value {
    pub origin: SourceRange,
    pub value: hcl::Value,
}

/// The evaluated lets of a directory.
#[derive(Debug, Default)]
pub struct LetMap(IndexMap<String, Value>);

/// Loads the expressions of a single `let` block.
///
/// Attributes map to their expressions directly. `map <name> { ... }`
/// sub-blocks map to a synthetic object expression built from the block
/// body; a map label colliding with an attribute name is a redefinition
/// error.
pub fn load(block: &Block, src: &SourceFile) -> Result<Exprs, TerrastackError> {
    let mut exprs = Exprs::default();

    for attr in block.body.attributes() {
        exprs.0.insert(attr.key.value().to_string(), expr_of(attr, src));
    }

    for map_block in block.body.blocks() {
        if map_block.ident.value().as_str() != "map" {
            return Err(TerrastackError::HclParseError {
                path: src.host_path.clone(),
                reason: format!(
                    "unexpected {} block inside let block",
                    map_block.ident.value()
                ),
            });
        }
        if map_block.labels.len() != 1 {
            return Err(TerrastackError::HclParseError {
                path: src.host_path.clone(),
                reason: "map block expects a single label".to_string(),
            });
        }
        let label = map_block.labels[0].as_str().to_string();
        if block
            .body
            .attributes()
            .any(|attr| attr.key.value().as_str() == label)
        {
            return Err(TerrastackError::MapRedefined { label });
        }
        let origin = src.range(map_block.span());
        exprs.0.insert(
            label,
            Expr {
                origin,
                expr: map_expression(&map_block.body, src)?,
            },
        );
    }

    Ok(exprs)
}

fn expr_of(attr: &Attribute, src: &SourceFile) -> Expr {
    Expr {
        origin: src.range(attr.value.span()),
        expr: attr.value.clone().into(),
    }
}

// Nested `map` blocks recurse into nested objects.
fn map_expression(body: &Body, src: &SourceFile) -> Result<hcl::Expression, TerrastackError> {
    let mut object: hcl::Object<hcl::ObjectKey, hcl::Expression> = Default::default();
    for attr in body.attributes() {
        object.insert(
            Identifier::sanitized(attr.key.value()).into(),
            attr.value.clone().into(),
        );
    }
    for nested in body.blocks() {
        if nested.ident.value().as_str() != "map" || nested.labels.len() != 1 {
            return Err(TerrastackError::HclParseError {
                path: src.host_path.clone(),
                reason: "map blocks may only nest single-label map blocks".to_string(),
            });
        }
        object.insert(
            Identifier::sanitized(nested.labels[0].as_str()).into(),
            map_expression(&nested.body, src)?,
        );
    }
    Ok(hcl::Expression::Object(object))
}

impl Exprs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Expr)> {
        self.0.iter()
    }

    /// Merges another set of expressions into this one, as when several
    /// `let` blocks of one directory form a single logical block.
    pub fn merge(&mut self, other: Exprs) -> Result<(), TerrastackError> {
        for (name, expr) in other.0 {
            if self.0.contains_key(&name) {
                return Err(TerrastackError::Redefined {
                    name: format!("let.{name}"),
                    path: expr.origin.host_path.clone(),
                });
            }
            self.0.insert(name, expr);
        }
        Ok(())
    }

    /// Evaluates all let expressions against the context, publishing the
    /// accumulated bindings under the `let` namespace.
    pub fn eval(self, ctx: &mut EvalContext) -> Result<LetMap, ErrorList> {
        self.eval_namespace(ctx, "let")
    }

    /// The fixpoint evaluator, parameterized by the namespace the bindings
    /// are published under (`let` for let blocks, `global` for globals).
    ///
    /// Each pass attempts every pending expression once:
    /// - references to undeclared namespaces are recorded as errors;
    /// - references to still-pending names of this namespace postpone the
    ///   expression to a later pass;
    /// - anything else is evaluated, and success publishes the grown
    ///   namespace so later expressions in the same pass can already use it.
    ///
    /// The loop ends when a full pass resolves nothing. Every expression
    /// still pending then either reports its recorded errors or, lacking
    /// any (the cycle case), an "undefined" error at its origin.
    pub(crate) fn eval_namespace(
        mut self,
        ctx: &mut EvalContext,
        namespace: &str,
    ) -> Result<LetMap, ErrorList> {
        let mut values = LetMap::default();
        let mut pending_errs: IndexMap<String, ErrorList> = IndexMap::new();

        self.remove_unset();

        if !ctx.has_namespace(namespace) {
            ctx.set_namespace(namespace, Map::new());
        }

        while !self.0.is_empty() {
            let mut progress = 0;

            trace!(namespace, pending = self.0.len(), "evaluating pending expressions");

            let names: Vec<String> = self.0.keys().cloned().collect();
            'pending: for name in names {
                let expr = self.0.get(&name).expect("pending name").clone();
                pending_errs.insert(name.clone(), ErrorList::new());

                for var in expr_variables(&expr.expr) {
                    if !ctx.has_namespace(&var.root) {
                        pending_errs
                            .get_mut(&name)
                            .expect("error list for pending name")
                            .push(TerrastackError::UnknownNamespace {
                                namespace: var.root.clone(),
                                range: expr.origin.clone(),
                            });
                        continue;
                    }

                    if var.root != namespace {
                        continue;
                    }

                    match var.steps.first() {
                        Some(Step::Attr(other)) => {
                            if self.0.contains_key(other) {
                                // forward reference, try again next pass
                                continue 'pending;
                            }
                        }
                        _ => {
                            return Err(TerrastackError::UnexpectedTraversal {
                                namespace: namespace.to_string(),
                                range: expr.origin.clone(),
                            }
                            .into());
                        }
                    }
                }

                if pending_errs.get(&name).is_some_and(|errs| !errs.is_empty()) {
                    continue;
                }

                match ctx.eval(&expr.expr) {
                    Ok(value) => {
                        trace!(namespace, %name, "expression evaluated");
                        values.0.insert(
                            name.clone(),
                            Value {
                                origin: expr.origin.clone(),
                                value,
                            },
                        );
                        self.0.shift_remove(&name);
                        pending_errs.shift_remove(&name);
                        ctx.set_namespace(namespace, values.attributes());
                        progress += 1;
                    }
                    Err(err) => {
                        pending_errs
                            .get_mut(&name)
                            .expect("error list for pending name")
                            .push(TerrastackError::Eval {
                                target: format!("{namespace}.{name}"),
                                reason: err.to_string(),
                                range: expr.origin.clone(),
                            });
                    }
                }
            }

            if progress == 0 {
                break;
            }
        }

        let mut errs = ErrorList::new();
        for (name, expr) in &self.0 {
            match pending_errs.shift_remove(name) {
                Some(list) if !list.is_empty() => errs.extend(list),
                _ => errs.push(TerrastackError::Undefined {
                    namespace: namespace.to_string(),
                    name: name.clone(),
                    range: expr.origin.clone(),
                }),
            }
        }

        errs.into_result(values)
    }

    // An entry whose expression is the bare identifier `unset` is removed
    // up front and never defined.
    fn remove_unset(&mut self) {
        self.0.retain(|_, expr| {
            !matches!(&expr.expr, hcl::Expression::Variable(var) if var.as_str() == "unset")
        });
    }
}

impl LetMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The evaluated bindings as a plain value map, the shape published
    /// into the evaluation context.
    pub fn attributes(&self) -> Map<String, hcl::Value> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.value.clone()))
            .collect()
    }
}

impl std::fmt::Display for LetMap {
    /// Renders the evaluated lets as HCL attributes.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = hcl::Body::builder();
        for (name, value) in &self.0 {
            builder = builder.add_attribute(hcl::Attribute::new(
                Identifier::sanitized(name),
                value.value.clone(),
            ));
        }
        let rendered = hcl::to_string(&builder.build()).map_err(|_| std::fmt::Error)?;
        f.write_str(&rendered)
    }
}
