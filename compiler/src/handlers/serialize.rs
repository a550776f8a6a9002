use std::sync::Arc;

use morphstack_schema::{Closure, Naming, PropertyRef, PropertyType, Value, Var};

use super::{
    date_from_wire, date_to_wire, is_function, literal_layout, name_for, CopyValue, ElementBuild,
    NestedLiteral,
};
use crate::chain::{skip, Chain, Handler};
use crate::emit::EmitContext;
use crate::error::CompileError;
use crate::hoist::Binding;
use crate::operation::OperationKind;
use crate::runtime::{self, Expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Model names to stored names, dates to strings.
    Out,
    /// Stored names to model names, strings to dates.
    In,
}

impl Direction {
    fn read(self) -> Naming {
        match self {
            Direction::Out => Naming::Model,
            Direction::In => Naming::Stored,
        }
    }

    fn write(self) -> Naming {
        match self {
            Direction::Out => Naming::Stored,
            Direction::In => Naming::Model,
        }
    }

    fn kind(self) -> OperationKind {
        match self {
            Direction::Out => OperationKind::Serialize,
            Direction::In => OperationKind::Deserialize,
        }
    }
}

pub(super) fn serialize_chain() -> Chain {
    wire_chain(Direction::Out)
}

pub(super) fn deserialize_chain() -> Chain {
    wire_chain(Direction::In)
}

fn wire_chain(direction: Direction) -> Chain {
    let (read, write) = (direction.read(), direction.write());
    Chain::builder(direction.kind(), literal_layout)
        .then(NestedLiteral::new(Var::Entity, read, write).scoped())
        .then(CustomCodec { direction })
        .then(DateCodec { direction })
        .then(ElementBuild::new(Var::Entity, read, write))
        .rule("function", is_function, skip)
        .then(CopyValue::new(Var::Entity, read, write))
        .build()
}

/// A field with its own serializer or deserializer. The closure receives
/// the field value and the whole entity. Nulls pass through uncalled.
struct CustomCodec {
    direction: Direction,
}

impl CustomCodec {
    fn closure<'t>(&self, prop: PropertyRef<'t>) -> Option<&'t Closure> {
        match self.direction {
            Direction::Out => prop.serializer(),
            Direction::In => prop.deserializer(),
        }
    }
}

impl Handler for CustomCodec {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn matches(&self, prop: PropertyRef<'_>) -> bool {
        self.closure(prop).is_some()
    }

    fn emit(&self, prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
        let Some(closure) = self.closure(prop) else {
            return Ok(());
        };
        let source = ctx.selector(prop, Var::Entity, self.direction.read());
        let call = ctx
            .hoist(prop, closure)?
            .call(
                ctx.tree(),
                vec![Binding::Path(source.clone()), Binding::Var(Var::Entity)],
            )?;
        let value: Expr = Arc::new(move |frame| match frame.select(&source) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(Value::Null)),
            Some(_) => call(frame),
        });
        ctx.property(prop, name_for(prop, self.direction.write()), value)
    }
}

/// Dates convert to and from ISO-8601 strings. Nullable and optional dates
/// are written by a guarded assignment that only runs when the field is
/// present, nested inside the presence guards of their ancestors.
struct DateCodec {
    direction: Direction,
}

impl Handler for DateCodec {
    fn name(&self) -> &'static str {
        "date"
    }

    fn matches(&self, prop: PropertyRef<'_>) -> bool {
        prop.ty() == PropertyType::Date
    }

    fn emit(&self, prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
        let convert = match self.direction {
            Direction::Out => date_to_wire,
            Direction::In => date_from_wire,
        };
        let source = ctx.selector(prop, Var::Entity, self.direction.read());
        if prop.modifiers().may_be_absent() {
            let target = ctx.assignment(prop, Var::Result, self.direction.write());
            ctx.guarded(
                prop,
                runtime::exists(source.clone()),
                runtime::assign(target, runtime::map_present(source, convert)),
            )
        } else {
            ctx.property(
                prop,
                name_for(prop, self.direction.write()),
                runtime::map_present(source, convert),
            )
        }
    }
}
