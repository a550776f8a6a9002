//! Per-operation handler chains.
//!
//! Each operation owns an ordered list of handlers. For every descriptor the
//! first handler whose predicate matches emits into the slot tree and the
//! chain stops. A descriptor no handler claims emits nothing.

use morphstack_schema::PropertyRef;
use once_cell::sync::Lazy;

use crate::emit::EmitContext;
use crate::error::CompileError;
use crate::handlers;
use crate::operation::OperationKind;

pub(crate) trait Handler: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, prop: PropertyRef<'_>) -> bool;
    fn emit(&self, prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError>;
}

pub(crate) type Predicate = fn(PropertyRef<'_>) -> bool;
pub(crate) type Emitter = fn(PropertyRef<'_>, &mut EmitContext<'_>) -> Result<(), CompileError>;
/// Sets up the operation's variables, sections and return before any
/// descriptor is visited.
pub(crate) type Layout = fn(&mut EmitContext<'_>) -> Result<(), CompileError>;

/// A handler made of two plain functions.
pub(crate) struct Rule {
    name: &'static str,
    matches: Predicate,
    emit: Emitter,
}

impl Handler for Rule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, prop: PropertyRef<'_>) -> bool {
        (self.matches)(prop)
    }

    fn emit(&self, prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
        (self.emit)(prop, ctx)
    }
}

/// Claims a descriptor without emitting anything.
pub(crate) fn skip(_prop: PropertyRef<'_>, _ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    Ok(())
}

pub(crate) struct Chain {
    kind: OperationKind,
    layout: Layout,
    handlers: Vec<Box<dyn Handler>>,
}

impl Chain {
    pub(crate) fn builder(kind: OperationKind, layout: Layout) -> ChainBuilder {
        ChainBuilder {
            kind,
            layout,
            handlers: Vec::new(),
        }
    }

    pub(crate) fn prepare(&self, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
        (self.layout)(ctx)
    }

    /// Runs the first matching handler. Returns its name, or `None` when
    /// the descriptor is not claimed.
    pub(crate) fn handle(
        &self,
        prop: PropertyRef<'_>,
        ctx: &mut EmitContext<'_>,
    ) -> Result<Option<&'static str>, CompileError> {
        for handler in &self.handlers {
            if handler.matches(prop) {
                tracing::trace!(
                    operation = %self.kind,
                    field = %prop.path(),
                    handler = handler.name(),
                    "handler matched"
                );
                handler.emit(prop, ctx)?;
                return Ok(Some(handler.name()));
            }
        }
        Ok(None)
    }

    #[cfg(test)]
    pub(crate) fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}

pub(crate) struct ChainBuilder {
    kind: OperationKind,
    layout: Layout,
    handlers: Vec<Box<dyn Handler>>,
}

impl ChainBuilder {
    pub(crate) fn then(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub(crate) fn rule(self, name: &'static str, matches: Predicate, emit: Emitter) -> Self {
        self.then(Rule {
            name,
            matches,
            emit,
        })
    }

    pub(crate) fn build(self) -> Chain {
        Chain {
            kind: self.kind,
            layout: self.layout,
            handlers: self.handlers,
        }
    }
}

static CHAINS: Lazy<Vec<Chain>> = Lazy::new(|| {
    OperationKind::ALL
        .iter()
        .map(|kind| handlers::chain(*kind))
        .collect()
});

pub(crate) fn chain_for(kind: OperationKind) -> &'static Chain {
    &CHAINS[kind.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order() {
        assert_eq!(
            chain_for(OperationKind::Merge).handler_names(),
            vec![
                "object",
                "function",
                "computed",
                "readonly",
                "factory default",
                "value"
            ]
        );
        assert_eq!(
            chain_for(OperationKind::Freeze).handler_names(),
            vec!["object", "elements"]
        );
        for kind in OperationKind::ALL {
            assert_eq!(chain_for(kind).kind, kind);
        }
    }
}
