use std::sync::Arc;

use morphstack_schema::{AccessPath, DefaultValue, Naming, PropertyRef, Value, Var};

use super::{any, in_place_layout, is_computed, is_function, is_object};
use crate::chain::{skip, Chain};
use crate::emit::EmitContext;
use crate::error::CompileError;
use crate::hoist::Binding;
use crate::operation::OperationKind;
use crate::runtime::{self, Cond, Flow, Stmt};

fn layout(ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    in_place_layout(ctx, Var::Destination)
}

/// Copies present source values into the destination. A null or absent
/// source value never overwrites. Computed fields are recomputed after
/// every copy has run.
pub(super) fn chain() -> Chain {
    Chain::builder(OperationKind::Merge, layout)
        .rule("object", is_object, merge_object)
        .rule("function", is_function, skip)
        .rule("computed", is_computed, recompute)
        .rule("readonly", |p| p.modifiers().readonly, merge_readonly)
        .rule("factory default", has_factory_default, merge_with_factory)
        .rule("value", any, merge_value)
        .build()
}

fn has_factory_default(prop: PropertyRef<'_>) -> bool {
    matches!(prop.default(), Some(DefaultValue::Factory(_)))
}

struct Paths {
    source: AccessPath,
    current: AccessPath,
    target: AccessPath,
}

fn paths(prop: PropertyRef<'_>, ctx: &EmitContext<'_>) -> Paths {
    Paths {
        source: ctx.selector(prop, Var::Source, Naming::Model),
        current: ctx.selector(prop, Var::Destination, Naming::Model),
        target: ctx.assignment(prop, Var::Destination, Naming::Model),
    }
}

fn not_object_at(path: AccessPath) -> Cond {
    Arc::new(move |frame| Ok(!frame.select(&path).is_some_and(Value::is_object)))
}

fn ensure_object(current: AccessPath, target: AccessPath) -> Stmt {
    runtime::assign_when(not_object_at(current), target, runtime::constant(Value::object()))
}

/// Nullable and optional objects are only descended into when the source
/// holds an object. Required objects always exist on the destination.
fn merge_object(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let Paths {
        source,
        current,
        target,
    } = paths(prop, ctx);
    if prop.modifiers().may_be_absent() {
        ctx.open_scope(prop, runtime::is_object_at(source))?;
        ctx.scoped_statement(prop, ensure_object(current, target))
    } else {
        ctx.statement(prop, ensure_object(current, target))
    }
}

fn recompute(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let Some(body) = prop.function_body() else {
        return Ok(());
    };
    let call = ctx
        .hoist(prop, body)?
        .call(ctx.tree(), vec![Binding::Var(Var::Destination)])?;
    let target = ctx.assignment(prop, Var::Destination, Naming::Model);
    ctx.computed(Arc::new(move |frame| {
        if let Some(value) = call(frame)? {
            frame.assign_if_parent(&target, value)?;
        }
        Ok(Flow::Next)
    }))
}

/// Readonly values are written once: a present source only fills an empty
/// destination.
fn merge_readonly(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let Paths {
        source,
        current,
        target,
    } = paths(prop, ctx);
    let present = runtime::is_present(source.clone());
    let empty = runtime::is_nullish(current);
    let cond: Cond = Arc::new(move |frame| Ok(present(frame)? && empty(frame)?));
    ctx.statement(
        prop,
        runtime::assign_when(cond, target, runtime::select_detached(source)),
    )
}

fn merge_with_factory(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let Some(DefaultValue::Factory(factory)) = prop.default() else {
        return Ok(());
    };
    let call = ctx
        .hoist(prop, factory)?
        .call(ctx.tree(), vec![Binding::Var(Var::Destination)])?;
    let Paths {
        source,
        current,
        target,
    } = paths(prop, ctx);
    ctx.statement(
        prop,
        Arc::new(move |frame| {
            let value = match frame.select(&source) {
                Some(value) if !value.is_null() => Some(value.detached()),
                _ if frame.select(&current).map_or(true, Value::is_null) => call(frame)?,
                _ => None,
            };
            if let Some(value) = value {
                frame.assign(&target, value)?;
            }
            Ok(Flow::Next)
        }),
    )
}

fn merge_value(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let Paths { source, target, .. } = paths(prop, ctx);
    ctx.statement(
        prop,
        runtime::assign_when(
            runtime::is_present(source.clone()),
            target,
            runtime::select_detached(source),
        ),
    )
}
