//! Entity model for Morphstack
//!
//! This crate provides the dynamic [`Value`] tree that entities are made of,
//! the [`PropertyTree`] of descriptors that describes an entity class, the
//! [`Closure`] type carried by computed fields, defaults and custom
//! (de)serializers, and the [`PathContext`] used to address a descriptor's
//! value from an operation variable.

pub mod closure;
pub mod error;
pub mod path;
pub mod property;
pub mod value;

pub use closure::*;
pub use error::*;
pub use path::*;
pub use property::*;
pub use value::*;
