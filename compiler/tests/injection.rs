use std::collections::HashMap;
use std::sync::Arc;

use morphstack_compiler::schema::{
    Closure, ClosureBody, FieldDef, InjectionToken, PropertyTree, TrackingMode, Value,
};
use morphstack_compiler::{
    CompileError, CompilerConfig, EntityOperations, Injector, NoDependencies, OperationKind,
    SchemaRegistry,
};
use serde_json::json;

fn clock() -> InjectionToken {
    InjectionToken::new("clock")
}

/// `(clock) => () => clock`
fn stamped() -> Closure {
    Closure::injected(
        [clock()],
        Closure::expression(Vec::<String>::new(), |args| args.get("clock").clone()),
    )
}

fn schema() -> Arc<PropertyTree> {
    let tree = PropertyTree::build(
        "Post",
        [
            FieldDef::string("id").key(),
            FieldDef::string("createdAt").default_with(stamped()),
            FieldDef::string("updatedAt").default_with(stamped()),
        ],
    )
    .expect("schema should be valid");
    Arc::new(tree)
}

fn dependencies() -> Arc<dyn Injector> {
    let mut deps = HashMap::new();
    deps.insert("clock".to_string(), Value::from("2024-01-01"));
    Arc::new(deps)
}

#[test]
fn test_injected_defaults() {
    let ops = EntityOperations::compile(schema(), dependencies(), CompilerConfig::default()).unwrap();
    let post = ops
        .enrich(Value::from(json!({ "id": "p1" })), TrackingMode::Disabled)
        .unwrap();
    assert_eq!(
        post.to_json(),
        json!({ "id": "p1", "createdAt": "2024-01-01", "updatedAt": "2024-01-01" })
    );
}

#[test]
fn test_shared_token_is_one_parameter() {
    let ops = EntityOperations::compile(schema(), dependencies(), CompilerConfig::default()).unwrap();
    let enrich = ops.operation(OperationKind::Enrich).unwrap();
    assert_eq!(enrich.params(), [clock()]);
    assert!(ops.operation(OperationKind::Clone).unwrap().params().is_empty());
}

#[test]
fn test_missing_dependency_fails_compilation() {
    let err = EntityOperations::compile(schema(), Arc::new(NoDependencies), CompilerConfig::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::MissingDependency { token } if token == clock()));
}

#[test]
fn test_missing_dependency_on_lazy_operation() {
    let ops = EntityOperations::compile(schema(), Arc::new(NoDependencies), CompilerConfig::lazy()).unwrap();
    assert!(ops.clone_entity(&Value::object()).is_ok());
    assert!(ops.enrich(Value::object(), TrackingMode::Disabled).is_err());
    assert!(!ops.is_compiled(OperationKind::Enrich));
}

#[test]
fn test_element_programs_share_dependencies() {
    let tree = PropertyTree::build(
        "Thread",
        [FieldDef::array_of(
            "posts",
            [FieldDef::string("createdAt").default_with(stamped())],
        )],
    )
    .unwrap();
    let ops = EntityOperations::compile(Arc::new(tree), dependencies(), CompilerConfig::default()).unwrap();
    assert_eq!(ops.operation(OperationKind::Enrich).unwrap().params(), [clock()]);

    let thread = ops
        .enrich(Value::from(json!({ "posts": [{}] })), TrackingMode::Disabled)
        .unwrap();
    assert_eq!(thread.to_json(), json!({ "posts": [{ "createdAt": "2024-01-01" }] }));
}

#[test]
fn test_unsupported_closure_names_the_field() {
    let curried_twice = Closure::from_layers(
        vec![vec!["a".into()], vec!["b".into()], vec!["c".into()]],
        vec![InjectionToken::new("a")],
        ClosureBody::Expression(Arc::new(|_| Value::Null)),
    );
    let tree = PropertyTree::build(
        "Customer",
        [FieldDef::object(
            "address",
            [FieldDef::string("city").default_with(curried_twice)],
        )],
    )
    .unwrap();
    let err = EntityOperations::compile(Arc::new(tree), dependencies(), CompilerConfig::default())
        .unwrap_err();

    match &err {
        CompileError::Field {
            field, operation, ..
        } => {
            assert_eq!(field, "address.city");
            assert_eq!(*operation, OperationKind::Enrich);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        err.root_cause(),
        CompileError::UnsupportedClosure { function, .. } if function == "fn_address_city_0"
    ));
}

#[test]
fn test_unbound_parameter() {
    let needs_two = Closure::expression(["value", "entity", "extra"], |_| Value::Null);
    let tree = PropertyTree::build("Tag", [FieldDef::string("label").serialize_with(needs_two)]).unwrap();
    let err = EntityOperations::compile(Arc::new(tree), dependencies(), CompilerConfig::default())
        .unwrap_err();
    assert_eq!(
        err.root_cause().to_string(),
        "parameter 'extra' of 'fn_label_0' is not bound at the call site"
    );
}

#[test]
fn test_function_prefix_is_configurable() {
    let failing = Closure::block(["entity"], |_| {
        Err(morphstack_compiler::schema::ClosureError::new("boom"))
    });
    let tree = PropertyTree::build("Tag", [FieldDef::string("label").default_with(failing)]).unwrap();
    let ops = EntityOperations::compile(
        Arc::new(tree),
        Arc::new(NoDependencies),
        CompilerConfig::lazy().with_function_prefix("default"),
    )
    .unwrap();
    let err = ops.enrich(Value::object(), TrackingMode::Disabled).unwrap_err();
    assert_eq!(err.to_string(), "function 'default_label_0' failed: boom");
}

#[test]
fn test_registry_lookup() {
    let registry = SchemaRegistry::new();
    registry
        .compile(schema(), dependencies(), CompilerConfig::default())
        .unwrap();

    let ops = registry.get("Post").expect("Post should be registered");
    let a = Value::from(json!({ "id": "p1", "createdAt": "x" }));
    let b = Value::from(json!({ "id": "p1", "createdAt": "y" }));
    assert!(ops.compare_ids(&a, &b).unwrap());
    assert_eq!(registry.entities(), vec!["Post"]);
}
