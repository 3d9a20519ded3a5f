use crate::resolver::{
    lookup, value_to_string, Condition, ConditionOperator, FunctionRegistry, PathExpr,
};
use crate::state::DeploymentStore;
use crate::types::{Node, RunContext};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// What an expression is evaluated against: the node it describes, the run
/// asking, and the attribute bag data paths walk.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub node: &'a Node,
    pub run: &'a RunContext,
    pub data: &'a Value,
}

impl<'a> Scope<'a> {
    pub fn new(node: &'a Node, run: &'a RunContext, data: &'a Value) -> Self {
        Self { node, run, data }
    }
}

/// Evaluates path expressions and `when` conditions
pub struct PathResolver {
    store: Arc<dyn DeploymentStore>,
    functions: FunctionRegistry,
}

impl PathResolver {
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self::with_functions(store, FunctionRegistry::with_builtin_functions())
    }

    pub fn with_functions(store: Arc<dyn DeploymentStore>, functions: FunctionRegistry) -> Self {
        Self { store, functions }
    }

    pub fn store(&self) -> &dyn DeploymentStore {
        self.store.as_ref()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Resolve `expr` in `scope`. Anything that cannot be found is `None`.
    pub async fn resolve(&self, scope: &Scope<'_>, expr: &PathExpr) -> Option<Value> {
        match expr {
            PathExpr::Data(path) => lookup(scope.data, path).cloned(),
            PathExpr::Custom(call) => match self.functions.get(&call.name) {
                Some(function) => function.call(self, scope, call).await,
                None => {
                    info!("Unknown custom function '{}' in {}", call.name, expr);
                    None
                }
            },
            PathExpr::Invalid { raw, error } => {
                debug!("Skipping unresolvable path {}: {}", raw, error);
                None
            }
        }
    }

    pub async fn resolve_str(&self, scope: &Scope<'_>, raw: &str) -> Option<Value> {
        self.resolve(scope, &PathExpr::parse(raw)).await
    }

    /// Evaluate a `<path> <op> <value>` guard. Absent values compare as the
    /// empty string; malformed conditions and unknown operators are false.
    pub async fn evaluate_condition(&self, scope: &Scope<'_>, condition: &Condition) -> bool {
        let comparison = match condition.comparison() {
            Ok(comparison) => comparison,
            Err(e) => {
                info!("EvalCondition: {}", e);
                return false;
            }
        };

        if let ConditionOperator::Unknown(op) = &comparison.operator {
            info!("EvalCondition: {} unknown in '{}'", op, condition.raw());
            return false;
        }

        let lvalue = self
            .resolve(scope, &comparison.path)
            .await
            .map(|v| value_to_string(&v))
            .unwrap_or_default();

        comparison
            .operator
            .compare(&lvalue, comparison.value.as_deref())
    }
}
