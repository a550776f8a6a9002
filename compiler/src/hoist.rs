//! Hoisting of user closures into named declarations.
//!
//! Every closure a handler needs (a computed body, a default factory or a
//! custom (de)serializer) is declared once in the factory's declaration
//! container under a unique name. Its call site binds each declared
//! parameter positionally to an operation variable, a path into one, or, for
//! the outer layer of an injection factory, a dependency token. Dependency
//! tokens are lifted onto the factory's parameter list.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use morphstack_schema::{AccessPath, Args, Closure, InjectionToken, Value, Var};

use crate::error::{CompileError, OperationError};
use crate::runtime::Expr;
use crate::slots::{paths, DeclId, SlotTree};

#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Var(Var),
    Path(AccessPath),
    Dependency(InjectionToken),
}

pub(crate) struct Hoisted {
    decl: DeclId,
    name: String,
    closure: Closure,
    params: Vec<String>,
    injected: Vec<(String, InjectionToken)>,
}

pub(crate) fn hoist(
    tree: &mut SlotTree,
    closure: &Closure,
    hint: &str,
    prefix: &str,
) -> Result<Hoisted, CompileError> {
    let container = tree.get(&paths::DECLARATIONS)?;
    let name = format!("{}_{}_{}", prefix, hint.replace('.', "_"), container.len());
    validate_shape(&name, closure)?;
    let decl = container.declare(name.clone());

    let injected = if closure.is_injected() {
        closure.layers()[0]
            .iter()
            .cloned()
            .zip(closure.injects().iter().cloned())
            .collect()
    } else {
        Vec::new()
    };
    tree.get(&paths::FACTORY)?
        .parameters(closure.injects().iter().cloned());

    tracing::trace!(function = %name, params = ?closure.params(), "hoisted closure");
    Ok(Hoisted {
        decl,
        name,
        closure: closure.clone(),
        params: closure.params().to_vec(),
        injected,
    })
}

fn validate_shape(name: &str, closure: &Closure) -> Result<(), CompileError> {
    let layers = closure.layers();
    match layers.len() {
        0 => return Err(CompileError::unsupported(name, "closure has no parameter list")),
        1 if !closure.injects().is_empty() => {
            return Err(CompileError::unsupported(
                name,
                "injection tokens require an injection layer",
            ))
        }
        1 => {}
        2 if layers[0].len() != closure.injects().len() => {
            return Err(CompileError::unsupported(
                name,
                format!(
                    "injection layer declares {} parameters for {} tokens",
                    layers[0].len(),
                    closure.injects().len()
                ),
            ))
        }
        2 => {}
        n => {
            return Err(CompileError::unsupported(
                name,
                format!("expected at most one injection layer, found {}", n - 1),
            ))
        }
    }

    let mut seen = HashSet::new();
    for param in layers.iter().flatten() {
        if !is_identifier(param) {
            return Err(CompileError::unsupported(
                name,
                format!("invalid parameter name '{}'", param),
            ));
        }
        if !seen.insert(param.as_str()) {
            return Err(CompileError::unsupported(
                name,
                format!("parameter '{}' is declared twice", param),
            ));
        }
    }
    Ok(())
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

impl Hoisted {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Attaches a call site. Bindings are positional, extra bindings are
    /// ignored and missing ones are an error.
    pub(crate) fn call(self, tree: &mut SlotTree, bindings: Vec<Binding>) -> Result<Expr, CompileError> {
        if let Some(param) = self.params.get(bindings.len()) {
            return Err(CompileError::UnboundParameter {
                function: self.name,
                param: param.clone(),
            });
        }
        tree.get(&paths::DECLARATIONS)?.attach(self.decl);

        let bound: Vec<(String, Binding)> = self
            .injected
            .into_iter()
            .map(|(param, token)| (param, Binding::Dependency(token)))
            .chain(self.params.into_iter().zip(bindings))
            .collect();
        let closure = self.closure;
        let function = self.name;

        Ok(Arc::new(move |frame| {
            let mut args = Args::new();
            for (param, binding) in &bound {
                let value = match binding {
                    Binding::Var(var) => frame.var(*var),
                    Binding::Path(path) => frame.select(path),
                    Binding::Dependency(token) => frame.dep(token),
                };
                args.push(param, value.map_or(Cow::Owned(Value::Null), Cow::Borrowed));
            }
            closure
                .invoke(&args)
                .map(Some)
                .map_err(|source| OperationError::Closure {
                    function: function.clone(),
                    source,
                })
        }))
    }
}
