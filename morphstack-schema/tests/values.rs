use morphstack_schema::{
    FieldDef, Object, PropertyTree, PropertyType, SchemaError, TrackingMode, Value, ValueError,
};
use serde_json::json;

#[test]
fn test_tree_lookup_and_order() {
    let tree = PropertyTree::build(
        "Customer",
        [
            FieldDef::string("id").key(),
            FieldDef::object(
                "address",
                [FieldDef::string("city"), FieldDef::string("zip").stored_as("postal_code")],
            ),
            FieldDef::number("age").optional(),
        ],
    )
    .unwrap();

    let names: Vec<_> = tree.pre_order().iter().map(|p| p.path()).collect();
    assert_eq!(names, ["id", "address", "address.city", "address.zip", "age"]);

    let zip = tree.find("address.zip").unwrap();
    assert_eq!(zip.stored_name(), "postal_code");
    assert_eq!(zip.parent().map(|p| p.name()), Some("address"));
    assert!(tree.find("address.street").is_none());
    assert!(tree.find("age").unwrap().modifiers().may_be_absent());
}

#[test]
fn test_invalid_schemas() {
    let err = PropertyTree::build("A", [FieldDef::boolean("flag").key()]).unwrap_err();
    assert_eq!(
        err,
        SchemaError::InvalidKey {
            path: "flag".into(),
            found: PropertyType::Boolean,
        }
    );

    let err = PropertyTree::build(
        "A",
        [FieldDef::object("meta", [FieldDef::string("x"), FieldDef::string("x")])],
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "duplicate field 'meta.x'");

    let err = PropertyTree::build("A", [FieldDef::string("id").identity().default_value("x")])
        .unwrap_err();
    assert!(matches!(err, SchemaError::IdentityDefault { .. }));
}

#[test]
fn test_lenient_select_strict_assign() {
    let mut value = Value::from(json!({ "a": { "b": 1 }, "n": null }));

    assert_eq!(value.select(["a", "b"]), Some(&Value::from(1)));
    assert_eq!(value.select(["n"]), Some(&Value::Null));
    assert_eq!(value.select(["n", "x"]), None);
    assert_eq!(value.select(["a", "b", "c"]), None);

    assert_eq!(value.assign(["a", "c"], Value::from(2)), Ok(None));
    assert!(matches!(
        value.assign(["n", "x"], Value::from(1)),
        Err(ValueError::MissingParent { .. })
    ));
    assert!(matches!(
        value.assign(["a", "b", "c"], Value::from(1)),
        Err(ValueError::NotAnObject { found: "number", .. })
    ));
}

#[test]
fn test_frozen_objects_reject_writes() {
    let mut value = Value::from(Object::new().with("name", "x"));
    assert!(value.freeze_at(std::iter::empty()));
    assert!(!value.freeze_at(std::iter::empty()));
    assert_eq!(
        value.assign(["name"], Value::from("y")),
        Err(ValueError::Frozen { key: "name".into() })
    );
    assert!(!value.detached().is_frozen());
}

#[test]
fn test_snapshot_tracking() {
    let mut value = Value::from(json!({ "name": "a", "meta": {} }));
    assert!(value.track_at(std::iter::empty(), TrackingMode::Snapshot));
    assert!(value.track_at(["meta"], TrackingMode::Keys));

    value.assign(["name"], Value::from("b")).unwrap();
    value.assign(["name"], Value::from("c")).unwrap();
    value.assign(["meta", "tag"], Value::from(true)).unwrap();
    // unchanged values are not recorded
    value.assign(["meta", "tag"], Value::from(true)).unwrap();

    assert_eq!(value.changed_paths(), ["name", "meta.tag"]);
    let root = value.as_object().unwrap();
    assert_eq!(root.previous("name"), Some(&Value::from("a")));
    assert_eq!(root.tracking_mode(), TrackingMode::Snapshot);
}

#[test]
fn test_canonical_form_is_json() {
    assert_eq!(Value::from("a|b").canonical(), r#""a|b""#);
    assert_eq!(Value::from("").canonical(), r#""""#);
    assert_eq!(Value::Null.canonical(), "null");
    assert_eq!(Value::from(json!({ "b": 1, "a": [true] })).canonical(), r#"{"a":[true],"b":1}"#);
    let date = morphstack_schema::parse_date("2024-03-01T12:00:00Z").unwrap();
    assert_eq!(Value::Date(date).canonical(), r#""2024-03-01T12:00:00.000Z""#);
}

#[test]
fn test_dates_format_with_millis() {
    let date = morphstack_schema::parse_date("2024-03-01T13:00:00+01:00").unwrap();
    assert_eq!(morphstack_schema::format_date(&date), "2024-03-01T12:00:00.000Z");
    assert!(morphstack_schema::parse_date("tomorrow").is_none());
    assert_eq!(Value::Date(date).to_json(), json!("2024-03-01T12:00:00.000Z"));
}
