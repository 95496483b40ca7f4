//! Free-variable enumeration for HCL expressions.
//!
//! Walks every sub-expression (arrays, objects, templates, function
//! arguments, for-expressions, traversals) and reports each variable
//! reference as a [`VarRef`]: the root namespace name plus the traversal
//! steps applied to it. Variables bound by a `for` expression or template
//! directive are tracked as local and not reported.

use hcl::Expression;
use hcl::expr::{Operation, TraversalOperator};
use hcl::template::{Directive, Element, Template};

/// A single traversal step applied to a variable root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Attribute access: `.name`.
    Attr(String),
    /// Index access: `[expr]`.
    Index,
    /// Splat access: `.*` or `[*]`.
    Splat,
}

/// A free variable reference found inside an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    /// Root namespace name (`let`, `global`, ...).
    pub root: String,
    pub steps: Vec<Step>,
}

/// Enumerates all free variable references of the expression.
pub fn expr_variables(expr: &Expression) -> Vec<VarRef> {
    let mut refs = Vec::new();
    let mut bound = Vec::new();
    walk_expr(expr, &mut bound, &mut refs);
    refs
}

fn walk_expr(expr: &Expression, bound: &mut Vec<String>, refs: &mut Vec<VarRef>) {
    match expr {
        Expression::Variable(var) => {
            record(var.as_str(), Vec::new(), bound, refs);
        }
        Expression::Traversal(traversal) => {
            if let Expression::Variable(var) = &traversal.expr {
                let steps = traversal
                    .operators
                    .iter()
                    .map(|op| match op {
                        TraversalOperator::GetAttr(ident) => Step::Attr(ident.to_string()),
                        TraversalOperator::Index(_) | TraversalOperator::LegacyIndex(_) => Step::Index,
                        TraversalOperator::AttrSplat | TraversalOperator::FullSplat => Step::Splat,
                    })
                    .collect();
                record(var.as_str(), steps, bound, refs);
            } else {
                walk_expr(&traversal.expr, bound, refs);
            }
            // index operands may reference variables themselves
            for op in &traversal.operators {
                if let TraversalOperator::Index(index_expr) = op {
                    walk_expr(index_expr, bound, refs);
                }
            }
        }
        Expression::Array(items) => {
            for item in items {
                walk_expr(item, bound, refs);
            }
        }
        Expression::Object(object) => {
            for (key, value) in object {
                if let hcl::ObjectKey::Expression(key_expr) = key {
                    walk_expr(key_expr, bound, refs);
                }
                walk_expr(value, bound, refs);
            }
        }
        Expression::TemplateExpr(template_expr) => {
            if let Ok(template) = Template::from_expr(template_expr) {
                walk_template(&template, bound, refs);
            }
        }
        Expression::Parenthesis(inner) => walk_expr(inner, bound, refs),
        Expression::FuncCall(call) => {
            for arg in &call.args {
                walk_expr(arg, bound, refs);
            }
        }
        Expression::Conditional(cond) => {
            walk_expr(&cond.cond_expr, bound, refs);
            walk_expr(&cond.true_expr, bound, refs);
            walk_expr(&cond.false_expr, bound, refs);
        }
        Expression::Operation(operation) => match operation.as_ref() {
            Operation::Unary(unary) => walk_expr(&unary.expr, bound, refs),
            Operation::Binary(binary) => {
                walk_expr(&binary.lhs_expr, bound, refs);
                walk_expr(&binary.rhs_expr, bound, refs);
            }
        },
        Expression::ForExpr(for_expr) => {
            walk_expr(&for_expr.collection_expr, bound, refs);

            let depth = bound.len();
            if let Some(key_var) = &for_expr.key_var {
                bound.push(key_var.to_string());
            }
            bound.push(for_expr.value_var.to_string());

            if let Some(key_expr) = &for_expr.key_expr {
                walk_expr(key_expr, bound, refs);
            }
            walk_expr(&for_expr.value_expr, bound, refs);
            if let Some(cond_expr) = &for_expr.cond_expr {
                walk_expr(cond_expr, bound, refs);
            }

            bound.truncate(depth);
        }
        _ => {}
    }
}

fn walk_template(template: &Template, bound: &mut Vec<String>, refs: &mut Vec<VarRef>) {
    for element in template.elements() {
        match element {
            Element::Literal(_) => {}
            Element::Interpolation(interp) => walk_expr(&interp.expr, bound, refs),
            Element::Directive(Directive::If(directive)) => {
                walk_expr(&directive.cond_expr, bound, refs);
                walk_template(&directive.true_template, bound, refs);
                if let Some(false_template) = &directive.false_template {
                    walk_template(false_template, bound, refs);
                }
            }
            Element::Directive(Directive::For(directive)) => {
                walk_expr(&directive.collection_expr, bound, refs);

                let depth = bound.len();
                if let Some(key_var) = &directive.key_var {
                    bound.push(key_var.to_string());
                }
                bound.push(directive.value_var.to_string());
                walk_template(&directive.template, bound, refs);
                bound.truncate(depth);
            }
        }
    }
}

fn record(root: &str, steps: Vec<Step>, bound: &[String], refs: &mut Vec<VarRef>) {
    if bound.iter().any(|name| name == root) {
        return;
    }
    refs.push(VarRef {
        root: root.to_string(),
        steps,
    });
}
