//! Prepare and strip: both rebuild the entity, dropping what must not
//! cross a boundary. Prepare also renames to stored names for the storage
//! backend.

use std::sync::Arc;

use morphstack_schema::{Naming, PropertyKind, PropertyRef, Value, Var};

use super::{
    is_computed, is_function, literal_layout, name_for, CopyValue, ElementBuild, NestedLiteral,
};
use crate::chain::{skip, Chain, Handler};
use crate::emit::EmitContext;
use crate::error::CompileError;
use crate::operation::OperationKind;
use crate::runtime::Expr;

fn is_unmapped(prop: PropertyRef<'_>) -> bool {
    prop.modifiers().unmapped
}

pub(super) fn prepare_chain() -> Chain {
    Chain::builder(OperationKind::Prepare, literal_layout)
        .rule("function", is_function, skip)
        .rule("unmapped", is_unmapped, skip)
        .rule("computed", is_computed, keep_if_indexed)
        .rule("identity", |p| p.modifiers().identity && p.kind() != PropertyKind::Object, keep_if_set)
        .then(NestedLiteral::new(Var::Entity, Naming::Model, Naming::Stored))
        .rule("distinct", |p| p.modifiers().distinct && p.kind() == PropertyKind::ScalarArray, dedupe)
        .then(ElementBuild::new(Var::Entity, Naming::Model, Naming::Stored))
        .then(CopyValue::new(Var::Entity, Naming::Model, Naming::Stored))
        .build()
}

pub(super) fn strip_chain() -> Chain {
    Chain::builder(OperationKind::Strip, literal_layout)
        .rule("function", is_function, skip)
        .rule("computed", is_computed, skip)
        .rule("unmapped", is_unmapped, skip)
        .then(NestedLiteral::new(Var::Entity, Naming::Model, Naming::Model))
        .then(ElementBuild::new(Var::Entity, Naming::Model, Naming::Model))
        .then(CopyValue::new(Var::Entity, Naming::Model, Naming::Model))
        .build()
}

/// Computed values are only persisted when an index reads them.
fn keep_if_indexed(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    if !prop.is_indexed() {
        return Ok(());
    }
    CopyValue::new(Var::Entity, Naming::Model, Naming::Stored).emit(prop, ctx)
}

/// An unset identity is left for the store to assign.
fn keep_if_set(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let source = ctx.selector(prop, Var::Entity, Naming::Model);
    let value: Expr = Arc::new(move |frame| {
        Ok(frame
            .select(&source)
            .filter(|value| !value.is_null())
            .map(Value::detached))
    });
    ctx.property(prop, name_for(prop, Naming::Stored), value)
}

fn dedupe(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let source = ctx.selector(prop, Var::Entity, Naming::Model);
    let value: Expr = Arc::new(move |frame| {
        Ok(frame.select(&source).map(|value| match value {
            Value::Array(items) => Value::Array(distinct(items)),
            other => other.detached(),
        }))
    });
    ctx.property(prop, name_for(prop, Naming::Stored), value)
}

/// First occurrences, in order.
fn distinct(items: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.detached());
        }
    }
    out
}
