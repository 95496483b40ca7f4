//! Namespaced expression evaluation.

use hcl::Identifier;
use hcl::eval::{Context, Evaluate};
use hcl::value::Map;
use indexmap::IndexMap;

/// An expression evaluation context holding named value namespaces.
///
/// Each namespace (`let`, `global`, `terramate`, ...) is a flat map of
/// values published to expressions as a top-level object variable.
/// Namespaces are monotonically populated: evaluators replace a namespace
/// wholesale whenever new bindings become available, and expressions
/// evaluated afterwards see the updated view.
pub struct EvalContext {
    ctx: Context<'static>,
    namespaces: IndexMap<String, Map<String, hcl::Value>>,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalContext {
    pub fn new() -> Self {
        Self {
            ctx: Context::new(),
            namespaces: IndexMap::new(),
        }
    }

    /// Whether a namespace with the given root name is declared.
    pub fn has_namespace(&self, root: &str) -> bool {
        self.namespaces.contains_key(root)
    }

    /// Declares or replaces a namespace.
    pub fn set_namespace(&mut self, root: &str, values: Map<String, hcl::Value>) {
        self.ctx
            .declare_var(Identifier::sanitized(root), hcl::Value::Object(values.clone()));
        self.namespaces.insert(root.to_string(), values);
    }

    /// The current values of a namespace, if declared.
    pub fn namespace(&self, root: &str) -> Option<&Map<String, hcl::Value>> {
        self.namespaces.get(root)
    }

    /// Evaluates an expression with every declared namespace visible.
    pub fn eval(&self, expr: &hcl::Expression) -> Result<hcl::Value, hcl::eval::Error> {
        expr.evaluate(&self.ctx)
    }
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("namespaces", &self.namespaces.keys().collect::<Vec<_>>())
            .finish()
    }
}
