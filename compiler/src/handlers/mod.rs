//! Handler chains for the eleven operations, plus the handlers several of
//! them share.

mod clone;
mod compare;
mod enrich;
mod freeze;
mod hash;
mod merge;
mod serialize;
mod shaping;

use std::sync::Arc;

use morphstack_schema::{AccessPath, Naming, PropertyKind, PropertyRef, Value, Var};

use crate::chain::{Chain, Handler};
use crate::emit::EmitContext;
use crate::error::{CompileError, OperationError};
use crate::operation::OperationKind;
use crate::runtime::{self, Expr, Flow, Program, Stmt};
use crate::slots::{paths, FunctionFactory, Init, ObjectLiteral, Ret};

pub(crate) fn chain(kind: OperationKind) -> Chain {
    match kind {
        OperationKind::Clone => clone::chain(),
        OperationKind::Compare => compare::chain(),
        OperationKind::CompareIds => compare::ids_chain(),
        OperationKind::Deserialize => serialize::deserialize_chain(),
        OperationKind::Enrich => enrich::chain(),
        OperationKind::Freeze => freeze::chain(),
        OperationKind::Hash => hash::chain(),
        OperationKind::Merge => merge::chain(),
        OperationKind::Prepare => shaping::prepare_chain(),
        OperationKind::Serialize => serialize::serialize_chain(),
        OperationKind::Strip => shaping::strip_chain(),
    }
}

// ============================================================================
// Layouts
// ============================================================================

/// `result = { ... }; return result;`
fn literal_layout(ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let tree = ctx.tree();
    let factory = tree.install_factory()?;
    let literal = tree.insert(&paths::RESULT_OBJECT, ObjectLiteral::default())?;
    let root = tree.by_id::<FunctionFactory>(factory)?;
    root.variable(Var::Result, Init::Literal(literal));
    root.returns(Ret::Var(Var::Result));
    Ok(())
}

/// Mutates the input variable in place and returns it.
fn in_place_layout(ctx: &mut EmitContext<'_>, var: Var) -> Result<(), CompileError> {
    let tree = ctx.tree();
    let factory = tree.install_factory()?;
    tree.by_id::<FunctionFactory>(factory)?
        .returns(Ret::Var(var));
    Ok(())
}

// ============================================================================
// Predicates
// ============================================================================

fn is_object(prop: PropertyRef<'_>) -> bool {
    prop.kind() == PropertyKind::Object
}

fn is_object_array(prop: PropertyRef<'_>) -> bool {
    prop.kind() == PropertyKind::ObjectArray
}

fn is_function(prop: PropertyRef<'_>) -> bool {
    prop.kind() == PropertyKind::Function
}

fn is_computed(prop: PropertyRef<'_>) -> bool {
    prop.kind() == PropertyKind::Computed
}

fn any(_prop: PropertyRef<'_>) -> bool {
    true
}

fn name_for(prop: PropertyRef<'_>, naming: Naming) -> &str {
    match naming {
        Naming::Model => prop.name(),
        Naming::Stored => prop.stored_name(),
    }
}

// ============================================================================
// Shared handlers
// ============================================================================

/// Builds a nested literal for an object descriptor. Its children add
/// their members to it. When the source value is not an object it is
/// copied as is.
struct NestedLiteral {
    source: Var,
    read: Naming,
    write: Naming,
    /// Also open a presence branch for nullable or optional objects, so
    /// guarded writes below them have somewhere to go.
    scoped: bool,
}

impl NestedLiteral {
    fn new(source: Var, read: Naming, write: Naming) -> Self {
        Self {
            source,
            read,
            write,
            scoped: false,
        }
    }

    fn scoped(mut self) -> Self {
        self.scoped = true;
        self
    }
}

impl Handler for NestedLiteral {
    fn name(&self) -> &'static str {
        "object"
    }

    fn matches(&self, prop: PropertyRef<'_>) -> bool {
        is_object(prop)
    }

    fn emit(&self, prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
        let source = ctx.selector(prop, self.source, self.read);
        ctx.nested_object(prop, name_for(prop, self.write), Some(source.clone()))?;
        if self.scoped && prop.modifiers().may_be_absent() {
            ctx.open_scope(prop, runtime::is_object_at(source))?;
        }
        Ok(())
    }
}

/// Copies the source value into the result literal. Absent values are
/// omitted.
struct CopyValue {
    source: Var,
    read: Naming,
    write: Naming,
}

impl CopyValue {
    fn new(source: Var, read: Naming, write: Naming) -> Self {
        Self {
            source,
            read,
            write,
        }
    }
}

impl Handler for CopyValue {
    fn name(&self) -> &'static str {
        "value"
    }

    fn matches(&self, _prop: PropertyRef<'_>) -> bool {
        true
    }

    fn emit(&self, prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
        let source = ctx.selector(prop, self.source, self.read);
        ctx.property(prop, name_for(prop, self.write), runtime::select_detached(source))
    }
}

/// Runs the element program over an array of objects while building the
/// result literal.
struct ElementBuild {
    source: Var,
    read: Naming,
    write: Naming,
}

impl ElementBuild {
    fn new(source: Var, read: Naming, write: Naming) -> Self {
        Self {
            source,
            read,
            write,
        }
    }
}

impl Handler for ElementBuild {
    fn name(&self) -> &'static str {
        "elements"
    }

    fn matches(&self, prop: PropertyRef<'_>) -> bool {
        is_object_array(prop)
    }

    fn emit(&self, prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
        let program = ctx.compile_elements(prop)?;
        let source = ctx.selector(prop, self.source, self.read);
        ctx.property(prop, name_for(prop, self.write), map_elements(source, program))
    }
}

fn map_elements(path: AccessPath, program: Arc<Program>) -> Expr {
    Arc::new(move |frame| match frame.select(&path) {
        None => Ok(None),
        Some(Value::Array(items)) => {
            let extras = program.element_extras(frame);
            let mapped = items
                .iter()
                .map(|item| match item {
                    Value::Object(_) => program.execute_element(item.clone(), &extras, frame.deps()),
                    other => Ok(other.detached()),
                })
                .collect::<Result<Vec<_>, OperationError>>()?;
            Ok(Some(Value::Array(mapped)))
        }
        Some(other) => Ok(Some(other.detached())),
    })
}

/// Runs the element program over each object element of the array at
/// `path`, replacing the element with the program's result.
fn map_elements_in_place(path: AccessPath, program: Arc<Program>) -> Stmt {
    Arc::new(move |frame| {
        let extras = program.element_extras(frame);
        let deps = Arc::clone(frame.deps());
        let Some(root) = frame.var_mut(path.root()) else {
            return Ok(Flow::Next);
        };
        let Some(Value::Array(items)) = root.descend_mut(path.names()) else {
            return Ok(Flow::Next);
        };
        for item in items.iter_mut().filter(|item| item.is_object()) {
            let element = std::mem::take(item);
            *item = program.execute_element(element, &extras, &deps)?;
        }
        Ok(Flow::Next)
    })
}

/// Date values travel as ISO-8601 strings.
fn date_to_wire(value: &Value) -> Value {
    match value {
        Value::Date(date) => Value::String(morphstack_schema::format_date(date)),
        other => other.detached(),
    }
}

fn date_from_wire(value: &Value) -> Value {
    match value {
        Value::String(text) => match morphstack_schema::parse_date(text) {
            Some(date) => Value::Date(date),
            None => {
                tracing::warn!(value = %text, "unparseable date left unchanged");
                value.clone()
            }
        },
        other => other.detached(),
    }
}
