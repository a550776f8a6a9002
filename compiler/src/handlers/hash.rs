use std::sync::Arc;

use morphstack_schema::{parse_date, AccessPath, Naming, PropertyRef, PropertyType, Value, Var};

use super::{any, is_function, is_object};
use crate::chain::{skip, Chain};
use crate::emit::EmitContext;
use crate::error::CompileError;
use crate::operation::OperationKind;
use crate::runtime::Fragment;
use crate::slots::{paths, FunctionFactory, Ret, Template};

fn layout(ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let separator = ctx.config().hash_separator.clone();
    let tree = ctx.tree();
    let factory = tree.install_factory()?;
    let ids = tree.insert(&paths::HASH_IDS, Template::new(separator.clone()))?;
    let object = tree.insert(&paths::HASH_OBJECT, Template::new(separator))?;
    tree.by_id::<FunctionFactory>(factory)?
        .returns(Ret::Hash { ids, object });
    Ok(())
}

/// Two templates: key fields feed both, every other hashed field feeds the
/// object template only. Identity fields never feed either.
pub(super) fn chain() -> Chain {
    Chain::builder(OperationKind::Hash, layout)
        .rule("identity", |p| p.modifiers().identity, skip)
        .rule("object", is_object, skip)
        .rule("function", is_function, skip)
        .rule("key", |p| p.modifiers().key, hash_key)
        .rule("value", any, hash_value)
        .build()
}

/// Piece written for a field missing from the entity. Never valid JSON,
/// so it cannot collide with a present value.
const ABSENT: &str = "undefined";

fn fragment(path: AccessPath, date: bool) -> Fragment {
    Arc::new(move |frame| {
        Ok(match frame.select(&path) {
            None => ABSENT.to_string(),
            Some(value) if date => canonical_date(value),
            Some(value) => value.canonical(),
        })
    })
}

/// Dates hash the same whether held as dates or as ISO strings.
fn canonical_date(value: &Value) -> String {
    match value {
        Value::String(text) => match parse_date(text) {
            Some(date) => Value::Date(date).canonical(),
            None => value.canonical(),
        },
        other => other.canonical(),
    }
}

fn hash_key(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let path = ctx.selector(prop, Var::Entity, Naming::Model);
    let piece = fragment(path, false);
    let tree = ctx.tree();
    tree.get(&paths::HASH_IDS)?.append(Arc::clone(&piece));
    tree.get(&paths::HASH_OBJECT)?.append(piece);
    Ok(())
}

fn hash_value(prop: PropertyRef<'_>, ctx: &mut EmitContext<'_>) -> Result<(), CompileError> {
    let path = ctx.selector(prop, Var::Entity, Naming::Model);
    let piece = fragment(path, prop.ty() == PropertyType::Date);
    ctx.tree().get(&paths::HASH_OBJECT)?.append(piece);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_date() {
        let expected = "\"2024-01-01T00:00:00.000Z\"";
        let date = Value::Date(parse_date("2024-01-01T00:00:00Z").unwrap());
        assert_eq!(canonical_date(&date), expected);
        assert_eq!(canonical_date(&Value::from("2024-01-01T01:00:00+01:00")), expected);
        assert_eq!(canonical_date(&Value::from("soon")), "\"soon\"");
        assert_eq!(canonical_date(&Value::Null), "null");
    }
}
