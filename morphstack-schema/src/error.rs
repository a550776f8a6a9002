use thiserror::Error;

use crate::property::PropertyType;

/// Errors raised while building a [`PropertyTree`](crate::PropertyTree).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("field name must not be empty (under '{parent}')")]
    EmptyName { parent: String },

    #[error("duplicate field '{path}'")]
    DuplicateField { path: String },

    #[error("key field '{path}' must be a String or Number, found {found}")]
    InvalidKey { path: String, found: PropertyType },

    #[error("identity field '{path}' cannot declare a literal default")]
    IdentityDefault { path: String },

    #[error("field '{path}' of type {found} cannot declare children")]
    UnexpectedChildren { path: String, found: PropertyType },

    #[error("computed field '{path}' has no function body")]
    MissingFunctionBody { path: String },
}

/// Errors raised when mutating a [`Value`](crate::Value).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("cannot assign '{key}' on a frozen object")]
    Frozen { key: String },

    #[error("cannot assign '{path}': parent is absent")]
    MissingParent { path: String },

    #[error("expected an object at '{path}', found {found}")]
    NotAnObject { path: String, found: &'static str },
}
