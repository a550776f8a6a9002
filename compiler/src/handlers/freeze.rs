use std::sync::Arc;

use morphstack_schema::{AccessPath, Naming, PropertyRef, Var};

use super::{in_place_layout, is_object, is_object_array, map_elements_in_place};
use crate::chain::Chain;
use crate::emit::EmitContext;
use crate::error::CompileError;
use crate::operation::OperationKind;
use crate::runtime::{Flow, Stmt};

fn layout(ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    in_place_layout(ctx, Var::Entity)?;
    ctx.epilogue(freeze(AccessPath::new(Var::Entity)))
}

/// Every statement is prepended, and descriptors are visited parents
/// first, so the deepest objects freeze first and the root freezes last.
pub(super) fn chain() -> Chain {
    Chain::builder(OperationKind::Freeze, layout)
        .rule("object", is_object, freeze_object)
        .rule("elements", is_object_array, freeze_elements)
        .build()
}

fn freeze(path: AccessPath) -> Stmt {
    Arc::new(move |frame| {
        if let Some(root) = frame.var_mut(path.root()) {
            root.freeze_at(path.names());
        }
        Ok(Flow::Next)
    })
}

fn freeze_object(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let path = ctx.selector(prop, Var::Entity, Naming::Model);
    ctx.prologue(freeze(path))
}

fn freeze_elements(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let program = ctx.compile_elements(prop)?;
    let path = ctx.selector(prop, Var::Entity, Naming::Model);
    ctx.prologue(map_elements_in_place(path, program))
}
