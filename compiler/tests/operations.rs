use std::sync::Arc;

use morphstack_compiler::schema::{FieldDef, PropertyTree, Value, ValueError};
use morphstack_compiler::{
    CompilerConfig, EntityOperations, HashMode, NoDependencies, OperationError, OperationKind,
};
use serde_json::json;
use sha2::{Digest, Sha256};

fn compile(name: &str, fields: Vec<FieldDef>) -> EntityOperations {
    let tree = PropertyTree::build(name, fields).expect("schema should be valid");
    EntityOperations::compile(Arc::new(tree), Arc::new(NoDependencies), CompilerConfig::default())
        .expect("operations should compile")
}

fn product() -> EntityOperations {
    compile(
        "Product",
        vec![
            FieldDef::string("id").identity(),
            FieldDef::string("sku").key(),
            FieldDef::string("name"),
            FieldDef::number("price"),
            FieldDef::date("listedAt").optional(),
        ],
    )
}

fn sha256(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[test]
fn test_clone_is_structural_copy() {
    let ops = compile(
        "Customer",
        vec![FieldDef::object("address", [FieldDef::string("city")])],
    );
    let original = ops
        .freeze(Value::from(json!({ "address": { "city": "X" } })))
        .unwrap();
    let copy = ops.clone_entity(&original).unwrap();

    assert_eq!(copy, original);
    assert!(original.get("address").unwrap().is_frozen());
    assert!(!copy.get("address").unwrap().is_frozen());
    assert!(!copy.is_frozen());
}

#[test]
fn test_clone_skips_unknown_and_keeps_null() {
    let ops = product();
    let copy = ops
        .clone_entity(&Value::from(json!({ "sku": "A", "name": null, "extra": 1 })))
        .unwrap();
    assert_eq!(copy.to_json(), json!({ "sku": "A", "name": null }));
}

#[test]
fn test_compare() {
    let ops = product();
    let a = Value::from(json!({ "sku": "A", "name": "Widget", "price": 5 }));
    let b = Value::from(json!({ "sku": "A", "name": "Widget", "price": 5, "listedAt": null }));
    let c = Value::from(json!({ "sku": "A", "name": "Gadget", "price": 5 }));

    assert!(ops.compare(&a, &b).unwrap());
    assert!(!ops.compare(&a, &c).unwrap());
    assert!(ops.compare_ids(&a, &c).unwrap());
    assert!(!ops
        .compare_ids(&a, &Value::from(json!({ "sku": "B" })))
        .unwrap());
}

#[test]
fn test_compare_arrays_structurally() {
    let ops = compile(
        "Basket",
        vec![
            FieldDef::array("tags"),
            FieldDef::array_of("lines", [FieldDef::string("sku"), FieldDef::number("qty")]),
        ],
    );
    let base = Value::from(json!({
        "tags": ["a", "b"],
        "lines": [{ "sku": "x", "qty": 1 }, { "sku": "y", "qty": 2 }],
    }));
    let same = Value::from(json!({
        "tags": ["a", "b"],
        "lines": [{ "sku": "x", "qty": 1 }, { "sku": "y", "qty": 2 }],
    }));
    let tag_changed = Value::from(json!({
        "tags": ["a", "c"],
        "lines": [{ "sku": "x", "qty": 1 }, { "sku": "y", "qty": 2 }],
    }));
    let tags_reordered = Value::from(json!({
        "tags": ["b", "a"],
        "lines": [{ "sku": "x", "qty": 1 }, { "sku": "y", "qty": 2 }],
    }));
    let line_changed = Value::from(json!({
        "tags": ["a", "b"],
        "lines": [{ "sku": "x", "qty": 1 }, { "sku": "y", "qty": 3 }],
    }));
    let lines_reordered = Value::from(json!({
        "tags": ["a", "b"],
        "lines": [{ "sku": "y", "qty": 2 }, { "sku": "x", "qty": 1 }],
    }));

    assert!(ops.compare(&base, &same).unwrap());
    assert!(!ops.compare(&base, &tag_changed).unwrap());
    assert!(!ops.compare(&base, &tags_reordered).unwrap());
    assert!(!ops.compare(&base, &line_changed).unwrap());
    assert!(!ops.compare(&base, &lines_reordered).unwrap());
}

#[test]
fn test_hash_modes() {
    let ops = product();
    let a = Value::from(json!({ "id": "1", "sku": "ABC", "name": "Widget", "price": 5 }));
    let b = Value::from(json!({ "id": "2", "sku": "ABC", "name": "Gadget", "price": 5 }));

    assert_eq!(ops.hash(&a, HashMode::Ids).unwrap(), sha256(r#""ABC""#));
    assert_eq!(
        ops.hash(&a, HashMode::Ids).unwrap(),
        ops.hash(&b, HashMode::Ids).unwrap()
    );
    assert_ne!(
        ops.hash(&a, HashMode::Object).unwrap(),
        ops.hash(&b, HashMode::Object).unwrap()
    );
    assert_eq!(
        ops.hash(&a, HashMode::Object).unwrap(),
        sha256(r#""ABC"|"Widget"|5|undefined"#)
    );
}

#[test]
fn test_hash_tells_null_empty_and_absent_apart() {
    let ops = product();
    let empty = Value::from(json!({ "sku": "A", "name": "" }));
    let null = Value::from(json!({ "sku": "A", "name": null }));
    let absent = Value::from(json!({ "sku": "A" }));

    let hashes: Vec<String> = [&empty, &null, &absent]
        .into_iter()
        .map(|entity| ops.hash(entity, HashMode::Object).unwrap())
        .collect();
    assert_ne!(hashes[0], hashes[1]);
    assert_ne!(hashes[0], hashes[2]);
    assert_ne!(hashes[1], hashes[2]);
}

#[test]
fn test_hash_separator_inside_values() {
    let ops = compile(
        "Pair",
        vec![
            FieldDef::string("sku").key(),
            FieldDef::string("a"),
            FieldDef::string("b"),
        ],
    );
    let left = Value::from(json!({ "sku": "k", "a": "x|", "b": "" }));
    let right = Value::from(json!({ "sku": "k", "a": "x", "b": "|" }));
    assert_ne!(
        ops.hash(&left, HashMode::Object).unwrap(),
        ops.hash(&right, HashMode::Object).unwrap()
    );
    assert_eq!(
        ops.hash(&left, HashMode::Ids).unwrap(),
        ops.hash(&right, HashMode::Ids).unwrap()
    );
}

#[test]
fn test_hash_ignores_identity() {
    let ops = product();
    let a = Value::from(json!({ "id": "1", "sku": "ABC", "name": "Widget" }));
    let b = Value::from(json!({ "id": "2", "sku": "ABC", "name": "Widget" }));
    assert_eq!(
        ops.hash(&a, HashMode::Object).unwrap(),
        ops.hash(&b, HashMode::Object).unwrap()
    );
}

#[test]
fn test_hash_dates_are_canonical() {
    let ops = product();
    let as_string = Value::from(json!({ "sku": "A", "listedAt": "2024-01-01T01:00:00+01:00" }));
    let mut as_date = Value::from(json!({ "sku": "A" }));
    let date = morphstack_compiler::schema::parse_date("2024-01-01T00:00:00Z").unwrap();
    as_date.assign(["listedAt"], Value::Date(date)).unwrap();

    assert_eq!(
        ops.hash(&as_string, HashMode::Object).unwrap(),
        ops.hash(&as_date, HashMode::Object).unwrap()
    );
}

#[test]
fn test_hash_rejects_unknown_mode() {
    let ops = product();
    let err = ops
        .run(OperationKind::Hash, vec![Value::object(), Value::from("all")])
        .unwrap_err();
    assert!(matches!(
        err,
        OperationError::InvalidInput {
            operation: OperationKind::Hash,
            ..
        }
    ));
}

#[test]
fn test_arity_is_checked() {
    let ops = product();
    let err = ops.run(OperationKind::Merge, vec![Value::object()]).unwrap_err();
    assert_eq!(err.to_string(), "merge expects 2 arguments, got 1");
}

#[test]
fn test_freeze_children_and_root() {
    let ops = compile(
        "Order",
        vec![
            FieldDef::string("id").key(),
            FieldDef::object(
                "shipping",
                [FieldDef::object("address", [FieldDef::string("city")])],
            )
            .nullable(),
            FieldDef::array_of("lines", [FieldDef::string("sku")]),
        ],
    );
    let frozen = ops
        .freeze(Value::from(json!({
            "id": "o1",
            "shipping": { "address": { "city": "X" } },
            "lines": [{ "sku": "a" }, "raw"],
        })))
        .unwrap();

    assert!(frozen.is_frozen());
    assert!(frozen.get("shipping").unwrap().is_frozen());
    assert!(frozen
        .select(["shipping", "address"])
        .unwrap()
        .is_frozen());
    let lines = frozen.get("lines").and_then(Value::as_array).unwrap();
    assert!(lines[0].is_frozen());

    let mut target = frozen.clone();
    let err = target
        .assign(["shipping", "address", "city"], Value::from("Y"))
        .unwrap_err();
    assert_eq!(
        err,
        ValueError::Frozen {
            key: "city".to_string()
        }
    );
}

#[test]
fn test_freeze_is_idempotent() {
    let ops = compile(
        "Order",
        vec![FieldDef::object("address", [FieldDef::string("city")]).optional()],
    );
    let once = ops
        .freeze(Value::from(json!({ "address": { "city": "X" } })))
        .unwrap();
    let twice = ops.freeze(once.clone()).unwrap();
    assert_eq!(once, twice);
    assert!(twice.get("address").unwrap().is_frozen());

    let absent = ops.freeze(Value::from(json!({ "address": null }))).unwrap();
    assert_eq!(absent.to_json(), json!({ "address": null }));
}

#[test]
fn test_frozen_destination_rejects_merge() {
    let ops = product();
    let frozen = ops.freeze(Value::from(json!({ "sku": "A" }))).unwrap();
    let err = ops
        .merge(frozen, &Value::from(json!({ "name": "Widget" })))
        .unwrap_err();
    assert!(matches!(
        err,
        OperationError::Value(ValueError::Frozen { .. })
    ));
}
