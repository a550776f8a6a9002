use std::sync::Arc;

use morphstack_schema::{parse_date, Naming, PropertyRef, PropertyType, Value, Var};

use super::{any, is_function, is_object};
use crate::chain::{skip, Chain};
use crate::emit::EmitContext;
use crate::error::CompileError;
use crate::operation::OperationKind;
use crate::runtime::{self, Flow};
use crate::slots::{paths, AndChain, FunctionFactory, Ret};

fn layout(ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let tree = ctx.tree();
    let factory = tree.install_factory()?;
    let and = tree.insert(&paths::COMPARE_AND, AndChain::default())?;
    tree.by_id::<FunctionFactory>(factory)?
        .returns(Ret::And(and));
    Ok(())
}

fn ids_layout(ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let tree = ctx.tree();
    let factory = tree.install_factory()?;
    tree.by_id::<FunctionFactory>(factory)?
        .returns(Ret::Expr(runtime::constant(Value::Bool(true))));
    Ok(())
}

/// Structural equality over every descriptor.
pub(super) fn chain() -> Chain {
    Chain::builder(OperationKind::Compare, layout)
        .rule("nullable object", is_nullable_object, compare_presence)
        .rule("object", is_object, skip)
        .rule("function", is_function, skip)
        .rule("date", |p| p.ty() == PropertyType::Date, compare_dates)
        .rule("value", any, compare_values)
        .build()
}

/// Equality of key fields only. Returns false at the first mismatch.
pub(super) fn ids_chain() -> Chain {
    Chain::builder(OperationKind::CompareIds, ids_layout)
        .rule("key", |p| p.modifiers().key, compare_key)
        .build()
}

fn is_nullable_object(prop: PropertyRef<'_>) -> bool {
    is_object(prop) && prop.modifiers().may_be_absent()
}

/// Null and absent compare equal.
fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Dates compare by instant, whether held as dates or ISO strings.
fn dates_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    fn instant(value: Option<&Value>) -> Option<i64> {
        match value? {
            Value::Date(date) => Some(date.timestamp_millis()),
            Value::String(text) => parse_date(text).map(|date| date.timestamp_millis()),
            _ => None,
        }
    }
    match (instant(a), instant(b)) {
        (Some(a), Some(b)) => a == b,
        _ => values_equal(a, b),
    }
}

fn and(ctx: &mut EmitContext<'_>, cond: runtime::Cond) -> Result<(), CompileError> {
    ctx.tree().get(&paths::COMPARE_AND)?.and(cond);
    Ok(())
}

fn compare_presence(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let a = ctx.selector(prop, Var::A, Naming::Model);
    let b = ctx.selector(prop, Var::B, Naming::Model);
    and(
        ctx,
        Arc::new(move |frame| {
            let present = |v: Option<&Value>| v.is_some_and(|v| !v.is_null());
            Ok(present(frame.select(&a)) == present(frame.select(&b)))
        }),
    )
}

fn compare_dates(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let a = ctx.selector(prop, Var::A, Naming::Model);
    let b = ctx.selector(prop, Var::B, Naming::Model);
    and(
        ctx,
        Arc::new(move |frame| Ok(dates_equal(frame.select(&a), frame.select(&b)))),
    )
}

fn compare_values(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let a = ctx.selector(prop, Var::A, Naming::Model);
    let b = ctx.selector(prop, Var::B, Naming::Model);
    and(
        ctx,
        Arc::new(move |frame| Ok(values_equal(frame.select(&a), frame.select(&b)))),
    )
}

fn compare_key(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let a = ctx.selector(prop, Var::A, Naming::Model);
    let b = ctx.selector(prop, Var::B, Naming::Model);
    ctx.tree().get(&paths::ASSIGNMENTS)?.push(Arc::new(move |frame| {
        if values_equal(frame.select(&a), frame.select(&b)) {
            Ok(Flow::Next)
        } else {
            Ok(Flow::Return(Value::Bool(false)))
        }
    }));
    Ok(())
}
