use std::sync::Arc;

use morphstack_schema::{
    AccessPath, DefaultValue, Naming, PropertyKind, PropertyRef, TrackingMode, Value, Var,
};

use super::{is_computed, is_object, is_object_array, map_elements_in_place};
use crate::chain::{skip, Chain};
use crate::emit::EmitContext;
use crate::error::{CompileError, OperationError};
use crate::hoist::Binding;
use crate::operation::OperationKind;
use crate::runtime::{self, Flow, Frame, Stmt};
use crate::slots::{FunctionFactory, Init, Ret};

/// `enriched = entity; ...; track(enriched, mode); return enriched;`
fn layout(ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let factory = ctx.tree().install_factory()?;
    let root = ctx.tree().by_id::<FunctionFactory>(factory)?;
    root.variable(Var::Enriched, Init::Move(Var::Entity));
    root.returns(Ret::Var(Var::Enriched));
    ctx.epilogue(track(AccessPath::new(Var::Enriched)))
}

/// Defaults, computed values and change tracking.
pub(super) fn chain() -> Chain {
    Chain::builder(OperationKind::Enrich, layout)
        .rule("object", is_object, enrich_object)
        .rule("identity", |p| p.modifiers().identity, skip)
        .rule("computed", is_computed, enrich_computed)
        .rule("factory default", has_factory_default, apply_factory_default)
        .rule("elements", is_object_array, enrich_elements)
        .rule("literal default", has_literal_default, apply_literal_default)
        .rule("array", is_required_array, ensure_array)
        .build()
}

fn has_factory_default(prop: PropertyRef<'_>) -> bool {
    matches!(prop.default(), Some(DefaultValue::Factory(_)))
}

fn has_literal_default(prop: PropertyRef<'_>) -> bool {
    matches!(prop.default(), Some(DefaultValue::Literal(_)))
}

fn is_required_array(prop: PropertyRef<'_>) -> bool {
    prop.kind() == PropertyKind::ScalarArray && !prop.modifiers().may_be_absent()
}

fn tracking_mode(frame: &Frame) -> Result<TrackingMode, OperationError> {
    match frame.var(Var::Mode) {
        None | Some(Value::Null) => Ok(TrackingMode::Disabled),
        Some(Value::String(text)) => {
            TrackingMode::parse(text).ok_or_else(|| invalid_mode(text))
        }
        Some(other) => Err(invalid_mode(other.type_name())),
    }
}

fn invalid_mode(found: &str) -> OperationError {
    OperationError::InvalidInput {
        operation: OperationKind::Enrich,
        message: format!(
            "tracking mode must be 'disabled', 'keys' or 'snapshot', found '{}'",
            found
        ),
    }
}

/// Installs a change tracker on the object at `path`, if there is one.
fn track(path: AccessPath) -> Stmt {
    Arc::new(move |frame| {
        let mode = tracking_mode(frame)?;
        if let Some(root) = frame.var_mut(path.root()) {
            root.track_at(path.names(), mode);
        }
        Ok(Flow::Next)
    })
}

fn enrich_object(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let selector = ctx.selector(prop, Var::Enriched, Naming::Model);
    if prop.modifiers().may_be_absent() {
        ctx.open_scope(prop, runtime::is_object_at(selector.clone()))?;
    } else {
        let target = ctx.assignment(prop, Var::Enriched, Naming::Model);
        ctx.statement(
            prop,
            runtime::assign_when(
                runtime::is_nullish(selector.clone()),
                target,
                runtime::constant(Value::object()),
            ),
        )?;
    }
    ctx.epilogue(track(selector))
}

fn enrich_computed(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let Some(body) = prop.function_body() else {
        return Ok(());
    };
    let call = ctx
        .hoist(prop, body)?
        .call(ctx.tree(), vec![Binding::Var(Var::Enriched)])?;
    let selector = ctx.selector(prop, Var::Enriched, Naming::Model);
    let target = ctx.assignment(prop, Var::Enriched, Naming::Model);
    let always = prop.modifiers().unmapped;
    ctx.computed(Arc::new(move |frame| {
        if always || frame.select(&selector).map_or(true, Value::is_null) {
            if let Some(value) = call(frame)? {
                frame.assign_if_parent(&target, value)?;
            }
        }
        Ok(Flow::Next)
    }))
}

fn apply_factory_default(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let Some(DefaultValue::Factory(factory)) = prop.default() else {
        return Ok(());
    };
    let call = ctx
        .hoist(prop, factory)?
        .call(ctx.tree(), vec![Binding::Var(Var::Enriched)])?;
    let selector = ctx.selector(prop, Var::Enriched, Naming::Model);
    let target = ctx.assignment(prop, Var::Enriched, Naming::Model);
    ctx.statement(prop, runtime::assign_when(runtime::is_nullish(selector), target, call))
}

fn apply_literal_default(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let Some(DefaultValue::Literal(value)) = prop.default() else {
        return Ok(());
    };
    let selector = ctx.selector(prop, Var::Enriched, Naming::Model);
    let target = ctx.assignment(prop, Var::Enriched, Naming::Model);
    ctx.statement(
        prop,
        runtime::assign_when(runtime::is_nullish(selector), target, runtime::constant(value.clone())),
    )
}

fn ensure_array(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let selector = ctx.selector(prop, Var::Enriched, Naming::Model);
    let target = ctx.assignment(prop, Var::Enriched, Naming::Model);
    ctx.statement(
        prop,
        runtime::assign_when(
            runtime::is_nullish(selector),
            target,
            runtime::constant(Value::Array(Vec::new())),
        ),
    )
}

/// Makes sure the array exists, then enriches each element in place.
fn enrich_elements(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    match prop.default() {
        Some(DefaultValue::Literal(_)) => apply_literal_default(prop, ctx)?,
        _ if !prop.modifiers().may_be_absent() => ensure_array(prop, ctx)?,
        _ => {}
    }
    let program = ctx.compile_elements(prop)?;
    let selector = ctx.selector(prop, Var::Enriched, Naming::Model);
    ctx.statement(prop, map_elements_in_place(selector, program))
}
