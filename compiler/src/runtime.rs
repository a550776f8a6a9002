//! Execution model of compiled operations.
//!
//! Linearization turns the slot tree into nested Rust closures over a
//! [`Frame`]. A compiled operation is a [`Program`] plus the dependency
//! values resolved for it.

use std::collections::BTreeMap;
use std::sync::Arc;

use morphstack_schema::{AccessPath, InjectionToken, Value, ValueError, Var};

use crate::error::{CompileError, OperationError};
use crate::operation::OperationKind;

/// Produces a value, or `None` when the member should be omitted.
pub(crate) type Expr = Arc<dyn Fn(&Frame) -> Result<Option<Value>, OperationError> + Send + Sync>;
pub(crate) type Cond = Arc<dyn Fn(&Frame) -> Result<bool, OperationError> + Send + Sync>;
pub(crate) type Stmt = Arc<dyn Fn(&mut Frame) -> Result<Flow, OperationError> + Send + Sync>;
/// One piece of a hash template.
pub(crate) type Fragment = Arc<dyn Fn(&Frame) -> Result<String, OperationError> + Send + Sync>;
pub(crate) type Body = Box<dyn Fn(&mut Frame) -> Result<Value, OperationError> + Send + Sync>;

pub(crate) enum Flow {
    Next,
    Return(Value),
}

/// Dependency values resolved for one compiled operation.
pub(crate) type Deps = BTreeMap<InjectionToken, Value>;

pub(crate) struct Frame {
    vars: Vec<(Var, Value)>,
    deps: Arc<Deps>,
}

impl Frame {
    pub(crate) fn new(deps: Arc<Deps>) -> Self {
        Self {
            vars: Vec::with_capacity(4),
            deps,
        }
    }

    pub(crate) fn bind(&mut self, var: Var, value: Value) {
        match self.vars.iter_mut().find(|(v, _)| *v == var) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((var, value)),
        }
    }

    pub(crate) fn var(&self, var: Var) -> Option<&Value> {
        self.vars.iter().find(|(v, _)| *v == var).map(|(_, value)| value)
    }

    pub(crate) fn var_mut(&mut self, var: Var) -> Option<&mut Value> {
        self.vars
            .iter_mut()
            .find(|(v, _)| *v == var)
            .map(|(_, value)| value)
    }

    pub(crate) fn take(&mut self, var: Var) -> Value {
        self.var_mut(var).map(std::mem::take).unwrap_or_default()
    }

    pub(crate) fn deps(&self) -> &Arc<Deps> {
        &self.deps
    }

    pub(crate) fn dep(&self, token: &InjectionToken) -> Option<&Value> {
        self.deps.get(token)
    }

    pub(crate) fn select(&self, path: &AccessPath) -> Option<&Value> {
        self.var(path.root())?.select(path.names())
    }

    pub(crate) fn assign(&mut self, path: &AccessPath, value: Value) -> Result<(), OperationError> {
        match self.var_mut(path.root()) {
            Some(root) => {
                root.assign(path.names(), value)?;
                Ok(())
            }
            None if path.is_root() => {
                self.bind(path.root(), value);
                Ok(())
            }
            None => Err(ValueError::MissingParent {
                path: path.to_string(),
            }
            .into()),
        }
    }

    /// Like [`assign`](Self::assign), but skips the write when an ancestor is
    /// missing. Returns whether the value was written.
    pub(crate) fn assign_if_parent(&mut self, path: &AccessPath, value: Value) -> Result<bool, OperationError> {
        let present = match path.parent() {
            Some(parent) => self.select(&parent).is_some_and(Value::is_object),
            None => true,
        };
        if present {
            self.assign(path, value)?;
        }
        Ok(present)
    }
}

/// A linearized operation, independent of dependency values.
pub struct Program {
    kind: OperationKind,
    params: Vec<InjectionToken>,
    body: Body,
}

impl Program {
    pub(crate) fn new(kind: OperationKind, params: Vec<InjectionToken>, body: Body) -> Self {
        Self { kind, params, body }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Dependency tokens the program reads, de-duplicated.
    pub fn params(&self) -> &[InjectionToken] {
        &self.params
    }

    pub(crate) fn execute(&self, inputs: Vec<Value>, deps: &Arc<Deps>) -> Result<Value, OperationError> {
        let expected = self.kind.inputs();
        if inputs.len() != expected.len() {
            return Err(OperationError::Arity {
                operation: self.kind,
                expected: expected.len(),
                found: inputs.len(),
            });
        }
        let mut frame = Frame::new(Arc::clone(deps));
        for (var, value) in expected.iter().zip(inputs) {
            frame.bind(*var, value);
        }
        (self.body)(&mut frame)
    }

    /// Inputs after the first, read from the enclosing frame. Element
    /// programs receive the element in first position and these after it.
    pub(crate) fn element_extras(&self, outer: &Frame) -> Vec<Value> {
        self.kind.inputs()[1..]
            .iter()
            .map(|var| outer.var(*var).cloned().unwrap_or_default())
            .collect()
    }

    pub(crate) fn execute_element(
        &self,
        element: Value,
        extras: &[Value],
        deps: &Arc<Deps>,
    ) -> Result<Value, OperationError> {
        let mut inputs = Vec::with_capacity(extras.len() + 1);
        inputs.push(element);
        inputs.extend(extras.iter().cloned());
        self.execute(inputs, deps)
    }

    /// Binds dependency values, producing a callable operation.
    pub(crate) fn resolve<F>(&self, mut lookup: F) -> Result<Deps, CompileError>
    where
        F: FnMut(&InjectionToken) -> Option<Value>,
    {
        self.params
            .iter()
            .map(|token| match lookup(token) {
                Some(value) => Ok((token.clone(), value)),
                None => Err(CompileError::MissingDependency {
                    token: token.clone(),
                }),
            })
            .collect()
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .finish()
    }
}

// ============================================================================
// Expression helpers
// ============================================================================

pub(crate) fn select_detached(path: AccessPath) -> Expr {
    Arc::new(move |frame| Ok(frame.select(&path).map(Value::detached)))
}

/// Applies `f` to present non-null values, passing nulls through.
pub(crate) fn map_present<F>(path: AccessPath, f: F) -> Expr
where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    Arc::new(move |frame| {
        Ok(frame.select(&path).map(|value| match value {
            Value::Null => Value::Null,
            other => f(other),
        }))
    })
}

pub(crate) fn constant(value: Value) -> Expr {
    Arc::new(move |_| Ok(Some(value.detached())))
}

/// True when the key exists, even if it holds null.
pub(crate) fn exists(path: AccessPath) -> Cond {
    Arc::new(move |frame| Ok(frame.select(&path).is_some()))
}

pub(crate) fn is_present(path: AccessPath) -> Cond {
    Arc::new(move |frame| Ok(frame.select(&path).is_some_and(|v| !v.is_null())))
}

pub(crate) fn is_nullish(path: AccessPath) -> Cond {
    Arc::new(move |frame| Ok(frame.select(&path).map_or(true, Value::is_null)))
}

pub(crate) fn is_object_at(path: AccessPath) -> Cond {
    Arc::new(move |frame| Ok(frame.select(&path).is_some_and(Value::is_object)))
}

/// `target = value` whenever `value` yields something.
pub(crate) fn assign(target: AccessPath, value: Expr) -> Stmt {
    Arc::new(move |frame| {
        if let Some(v) = value(frame)? {
            frame.assign(&target, v)?;
        }
        Ok(Flow::Next)
    })
}

/// `if cond { target = value }`
pub(crate) fn assign_when(cond: Cond, target: AccessPath, value: Expr) -> Stmt {
    Arc::new(move |frame| {
        if cond(frame)? {
            if let Some(v) = value(frame)? {
                frame.assign(&target, v)?;
            }
        }
        Ok(Flow::Next)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame() -> Frame {
        let mut frame = Frame::new(Arc::new(Deps::new()));
        frame.bind(
            Var::Entity,
            Value::from(json!({ "a": { "b": 1 }, "n": null })),
        );
        frame
    }

    #[test]
    fn test_conditions() {
        let frame = frame();
        let n = AccessPath::new(Var::Entity).child("n", false);
        let missing = AccessPath::new(Var::Entity).child("x", false);
        assert!(exists(n.clone())(&frame).unwrap());
        assert!(!is_present(n.clone())(&frame).unwrap());
        assert!(is_nullish(n)(&frame).unwrap());
        assert!(is_nullish(missing.clone())(&frame).unwrap());
        assert!(!exists(missing)(&frame).unwrap());
    }

    #[test]
    fn test_assign_if_parent() {
        let mut frame = frame();
        let ok = AccessPath::new(Var::Entity).child("a", false).child("c", false);
        let skipped = AccessPath::new(Var::Entity).child("z", false).child("c", false);
        assert!(frame.assign_if_parent(&ok, Value::from(2)).unwrap());
        assert!(!frame.assign_if_parent(&skipped, Value::from(2)).unwrap());
        assert_eq!(
            frame.var(Var::Entity).unwrap().to_json(),
            json!({ "a": { "b": 1, "c": 2 }, "n": null })
        );
    }
}
