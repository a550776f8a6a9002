use std::sync::Arc;

use chrono::{TimeZone, Utc};
use morphstack_compiler::schema::{Closure, ClosureError, FieldDef, Object, PropertyTree, Value};
use morphstack_compiler::{CompilerConfig, EntityOperations, NoDependencies, OperationError};
use serde_json::json;

fn compile(fields: Vec<FieldDef>) -> EntityOperations {
    let tree = PropertyTree::build("Entity", fields).expect("schema should be valid");
    EntityOperations::compile(Arc::new(tree), Arc::new(NoDependencies), CompilerConfig::default())
        .expect("operations should compile")
}

fn epoch() -> Value {
    Value::Date(Utc.timestamp_millis_opt(0).unwrap())
}

#[test]
fn test_date_round_trip() {
    let ops = compile(vec![FieldDef::date("createdAt")]);
    let entity = Value::from(Object::new().with("createdAt", epoch()));

    let wire = ops.serialize(&entity).unwrap();
    assert_eq!(wire.to_json(), json!({ "createdAt": "1970-01-01T00:00:00.000Z" }));
    assert_eq!(wire.get("createdAt"), Some(&Value::from("1970-01-01T00:00:00.000Z")));

    let back = ops.deserialize(&wire).unwrap();
    assert_eq!(back.get("createdAt"), Some(&epoch()));
    assert_eq!(back, entity);
}

#[test]
fn test_absent_fields_stay_absent() {
    let ops = compile(vec![
        FieldDef::date("createdAt"),
        FieldDef::date("deletedAt").nullable(),
        FieldDef::string("name"),
    ]);
    assert_eq!(ops.serialize(&Value::object()).unwrap().to_json(), json!({}));
    assert_eq!(
        ops.serialize(&Value::from(json!({ "deletedAt": null })))
            .unwrap()
            .to_json(),
        json!({ "deletedAt": null })
    );
    assert_eq!(ops.deserialize(&Value::object()).unwrap().to_json(), json!({}));
}

#[test]
fn test_nested_dates() {
    let ops = compile(vec![FieldDef::object(
        "meta",
        [
            FieldDef::date("seen").optional(),
            FieldDef::object("audit", [FieldDef::date("at")]),
        ],
    )
    .nullable()]);
    let meta = Object::new()
        .with("seen", epoch())
        .with("audit", Object::new().with("at", epoch()));
    let entity = Value::from(Object::new().with("meta", meta));

    let wire = ops.serialize(&entity).unwrap();
    assert_eq!(
        wire.to_json(),
        json!({ "meta": {
            "seen": "1970-01-01T00:00:00.000Z",
            "audit": { "at": "1970-01-01T00:00:00.000Z" },
        } })
    );
    assert_eq!(ops.deserialize(&wire).unwrap(), entity);
    assert_eq!(
        ops.serialize(&Value::from(json!({ "meta": null })))
            .unwrap()
            .to_json(),
        json!({ "meta": null })
    );
}

#[test]
fn test_deserialize_leaves_unparseable_dates() {
    let ops = compile(vec![FieldDef::date("at"), FieldDef::string("name")]);
    let out = ops
        .deserialize(&Value::from(json!({ "at": "soon", "name": "x", "extra": true })))
        .unwrap();
    assert_eq!(out.to_json(), json!({ "at": "soon", "name": "x" }));
}

#[test]
fn test_stored_names() {
    let ops = compile(vec![
        FieldDef::string("name").stored_as("full_name"),
        FieldDef::object("address", [FieldDef::string("zip").stored_as("postal_code")])
            .stored_as("addr"),
    ]);
    let entity = Value::from(json!({ "name": "x", "address": { "zip": "1000" } }));
    let stored = json!({ "full_name": "x", "addr": { "postal_code": "1000" } });

    assert_eq!(ops.serialize(&entity).unwrap().to_json(), stored);
    assert_eq!(ops.prepare(&entity).unwrap().to_json(), stored);
    assert_eq!(ops.deserialize(&Value::from(stored)).unwrap(), entity);
}

fn cents() -> FieldDef {
    FieldDef::number("price")
        .serialize_with(Closure::expression(["value", "entity"], |args| {
            Value::from(args.get("value").as_f64().unwrap_or_default() * 100.0)
        }))
        .deserialize_with(Closure::block(["value"], |args| {
            args.get("value")
                .as_f64()
                .map(|cents| Value::from(cents / 100.0))
                .ok_or_else(|| ClosureError::new("price must be a number"))
        }))
}

#[test]
fn test_custom_serializers_round_trip() {
    let ops = compile(vec![cents()]);
    let entity = Value::from(json!({ "price": 1.5 }));

    let wire = ops.serialize(&entity).unwrap();
    assert_eq!(wire.to_json(), json!({ "price": 150 }));
    assert_eq!(ops.deserialize(&wire).unwrap(), entity);

    let null = Value::from(json!({ "price": null }));
    assert_eq!(ops.serialize(&null).unwrap(), null);
    assert_eq!(ops.serialize(&Value::object()).unwrap(), Value::object());
}

#[test]
fn test_custom_deserializer_failure() {
    let ops = compile(vec![cents()]);
    let err = ops
        .deserialize(&Value::from(json!({ "price": "cheap" })))
        .unwrap_err();
    match err {
        OperationError::Closure { function, source } => {
            assert_eq!(function, "fn_price_0");
            assert_eq!(source.message(), "price must be a number");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_element_dates() {
    let ops = compile(vec![FieldDef::array_of(
        "events",
        [FieldDef::string("kind"), FieldDef::date("at")],
    )]);
    let event = Object::new().with("kind", "open").with("at", epoch());
    let entity = Value::from(Object::new().with("events", vec![Value::from(event), Value::from(7)]));

    let wire = ops.serialize(&entity).unwrap();
    assert_eq!(
        wire.to_json(),
        json!({ "events": [{ "kind": "open", "at": "1970-01-01T00:00:00.000Z" }, 7] })
    );
    assert_eq!(ops.deserialize(&wire).unwrap(), entity);
}

#[test]
fn test_prepare_shapes_for_storage() {
    let total = Closure::expression(["entity"], |_| Value::Null);
    let ops = compile(vec![
        FieldDef::string("id").identity(),
        FieldDef::string("name"),
        FieldDef::function("notify"),
        FieldDef::string("cache").unmapped(),
        FieldDef::array("tags").distinct(),
        FieldDef::computed("total", total.clone()).index("by_total"),
        FieldDef::computed("hidden", total),
    ]);
    let entity = Value::from(json!({
        "id": null,
        "name": "n",
        "cache": "c",
        "tags": ["a", "a", "b"],
        "total": 3,
        "hidden": 4,
    }));

    assert_eq!(
        ops.prepare(&entity).unwrap().to_json(),
        json!({ "name": "n", "tags": ["a", "b"], "total": 3 })
    );
    assert_eq!(
        ops.prepare(&Value::from(json!({ "id": "u1" }))).unwrap().to_json(),
        json!({ "id": "u1" })
    );
    assert_eq!(
        ops.strip(&entity).unwrap().to_json(),
        json!({ "id": null, "name": "n", "tags": ["a", "a", "b"] })
    );
}
