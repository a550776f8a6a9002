//! # morphstack-compiler
//!
//! Compiles an entity's descriptor tree into a set of specialised transform
//! operations, once per schema, so that callers never walk field metadata
//! per call.
//!
//! - **Handler chains** - one ordered chain per operation; the first handler
//!   matching a descriptor claims it
//! - **Slot tree** - the path-addressed builders handlers emit into
//! - **Hoisting** - user closures become named declarations bound at their
//!   call sites
//! - **Linearization** - the slot tree becomes one composed closure
//! - **Operation set** - the eleven compiled operations of an entity, plus
//!   a registry keyed by entity name
//!
//! ## Example
//!
//! ```rust,ignore
//! use morphstack_compiler::{CompilerConfig, EntityOperations, NoDependencies};
//! use morphstack_compiler::schema::{FieldDef, PropertyTree, TrackingMode};
//!
//! let tree = PropertyTree::build("User", [
//!     FieldDef::string("id").key().identity(),
//!     FieldDef::number("score").default_value(0),
//! ])?;
//! let ops = EntityOperations::compile(tree.into(), Arc::new(NoDependencies), CompilerConfig::default())?;
//! let user = ops.enrich(json!({ "id": "a" }).into(), TrackingMode::Keys)?;
//! ```

mod canonical_log;
mod chain;
mod emit;
mod handlers;
mod hoist;
mod linearize;
mod slots;

pub mod config;
pub mod driver;
pub mod error;
pub mod operation;
pub mod operations;
pub mod registry;
pub mod runtime;

pub use config::{CompilerConfig, DEFAULT_FUNCTION_PREFIX, DEFAULT_HASH_SEPARATOR};
pub use driver::{Compilation, CompilationState};
pub use error::{CompileError, OperationError};
pub use operation::{HashMode, OperationKind};
pub use operations::{CompiledOperation, EntityOperations, Injector, NoDependencies};
pub use registry::SchemaRegistry;
pub use runtime::Program;

pub use morphstack_schema as schema;
