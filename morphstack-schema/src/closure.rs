//! User-supplied functions attached to descriptors.
//!
//! A [`Closure`] is a native Rust function plus the parameter metadata the
//! compiler needs to hoist it: one or two layers of named parameters. A
//! two-layer closure is an injection factory. Its outer layer names the
//! dependencies, which are resolved once per compiled operation, and its
//! inner layer names the values passed at each call.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

static NULL: Value = Value::Null;

/// Identifies an injectable dependency by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InjectionToken(Arc<str>);

impl InjectionToken {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InjectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InjectionToken {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ClosureError {
    message: String,
}

impl ClosureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Named arguments for one closure call. Unknown names read as null.
#[derive(Debug, Default)]
pub struct Args<'a> {
    entries: Vec<(&'a str, Cow<'a, Value>)>,
}

impl<'a> Args<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'a str, value: Cow<'a, Value>) {
        self.entries.push((name, value));
    }

    pub fn with(mut self, name: &'a str, value: Value) -> Self {
        self.push(name, Cow::Owned(value));
        self
    }

    pub fn get(&self, name: &str) -> &Value {
        self.try_get(name).unwrap_or(&NULL)
    }

    pub fn try_get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type ExpressionFn = dyn for<'a> Fn(&Args<'a>) -> Value + Send + Sync;
type BlockFn = dyn for<'a> Fn(&Args<'a>) -> Result<Value, ClosureError> + Send + Sync;

#[derive(Clone)]
pub enum ClosureBody {
    /// Infallible single expression.
    Expression(Arc<ExpressionFn>),
    /// Fallible body with statements.
    Block(Arc<BlockFn>),
}

#[derive(Clone)]
pub struct Closure {
    layers: Vec<Vec<String>>,
    injects: Vec<InjectionToken>,
    body: ClosureBody,
}

impl Closure {
    pub fn expression<P, F>(params: P, f: F) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        F: for<'a> Fn(&Args<'a>) -> Value + Send + Sync + 'static,
    {
        Self {
            layers: vec![params.into_iter().map(Into::into).collect()],
            injects: Vec::new(),
            body: ClosureBody::Expression(Arc::new(f)),
        }
    }

    pub fn block<P, F>(params: P, f: F) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        F: for<'a> Fn(&Args<'a>) -> Result<Value, ClosureError> + Send + Sync + 'static,
    {
        Self {
            layers: vec![params.into_iter().map(Into::into).collect()],
            injects: Vec::new(),
            body: ClosureBody::Block(Arc::new(f)),
        }
    }

    /// Wraps `inner` in an injection layer. Each token becomes an outer
    /// parameter named after the token.
    pub fn injected<T>(tokens: T, inner: Closure) -> Self
    where
        T: IntoIterator<Item = InjectionToken>,
    {
        let injects: Vec<InjectionToken> = tokens.into_iter().collect();
        let mut layers = vec![injects.iter().map(|t| t.name().to_string()).collect()];
        layers.extend(inner.layers);
        let mut all = injects;
        all.extend(inner.injects);
        Self {
            layers,
            injects: all,
            body: inner.body,
        }
    }

    /// Raw constructor. Shape is checked when the closure is hoisted.
    pub fn from_layers(layers: Vec<Vec<String>>, injects: Vec<InjectionToken>, body: ClosureBody) -> Self {
        Self {
            layers,
            injects,
            body,
        }
    }

    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    /// Parameters of the innermost layer.
    pub fn params(&self) -> &[String] {
        self.layers.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn injects(&self) -> &[InjectionToken] {
        &self.injects
    }

    pub fn body(&self) -> &ClosureBody {
        &self.body
    }

    pub fn is_injected(&self) -> bool {
        self.layers.len() > 1
    }

    pub fn invoke(&self, args: &Args<'_>) -> Result<Value, ClosureError> {
        match &self.body {
            ClosureBody::Expression(f) => Ok(f(args)),
            ClosureBody::Block(f) => f(args),
        }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match self.body {
            ClosureBody::Expression(_) => "expression",
            ClosureBody::Block(_) => "block",
        };
        f.debug_struct("Closure")
            .field("layers", &self.layers)
            .field("injects", &self.injects)
            .field("body", &body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_reads_named_args() {
        let closure = Closure::expression(["entity"], |args| {
            let name = args.get("entity").get("name").and_then(Value::as_str);
            Value::from(name.unwrap_or("anonymous").to_uppercase())
        });
        let entity = Value::from(serde_json::json!({ "name": "ada" }));
        let args = Args::new().with("entity", entity);
        assert_eq!(closure.invoke(&args).unwrap(), Value::from("ADA"));
        assert_eq!(closure.params(), ["entity".to_string()]);
        assert!(!closure.is_injected());
    }

    #[test]
    fn test_injected_prepends_layer() {
        let clock = InjectionToken::new("clock");
        let closure = Closure::injected(
            [clock.clone()],
            Closure::block(Vec::<String>::new(), |args| {
                args.try_get("clock")
                    .cloned()
                    .ok_or_else(|| ClosureError::new("clock missing"))
            }),
        );
        assert!(closure.is_injected());
        assert_eq!(closure.layers().len(), 2);
        assert_eq!(closure.injects(), [clock]);
        assert!(closure.params().is_empty());
        assert_eq!(
            closure.invoke(&Args::new()).unwrap_err().message(),
            "clock missing"
        );
    }
}
