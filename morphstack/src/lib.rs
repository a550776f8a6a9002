//! # Morphstack
//!
//! Schema-driven entity transforms. Describe an entity once, compile it
//! once, and get dedicated clone, compare, hash, serialize, deserialize,
//! enrich, merge, freeze, prepare and strip operations for it.
//!
//! ## Features
//!
//! - **`compiler`** (default) - the operation compiler and schema registry
//! - **`telemetry`** - a `tracing-subscriber` setup helper
//!
//! ## Example
//!
//! ```rust,ignore
//! use morphstack::prelude::*;
//!
//! let tree = PropertyTree::build("User", [
//!     FieldDef::string("id").key().identity(),
//!     FieldDef::string("name"),
//!     FieldDef::number("score").default_value(0),
//! ])?;
//! let users = SchemaRegistry::global().compile(
//!     Arc::new(tree),
//!     Arc::new(NoDependencies),
//!     CompilerConfig::default(),
//! )?;
//! let user = users.enrich(json!({ "id": "a", "name": "x" }).into(), TrackingMode::Keys)?;
//! ```

pub use morphstack_schema as schema;

#[cfg(feature = "compiler")]
pub use morphstack_compiler as compiler;

#[cfg(feature = "telemetry")]
pub mod telemetry;

/// Prelude module for convenient imports
pub mod prelude {
    pub use morphstack_schema::{
        Closure, ClosureError, FieldDef, InjectionToken, Object, PropertyTree, PropertyType,
        TrackingMode, Value,
    };

    #[cfg(feature = "compiler")]
    pub use morphstack_compiler::{
        CompileError, CompilerConfig, EntityOperations, HashMode, Injector, NoDependencies,
        OperationError, OperationKind, SchemaRegistry,
    };

    #[cfg(feature = "telemetry")]
    pub use crate::telemetry::TelemetryConfig;
}
