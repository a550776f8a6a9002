use morphstack_schema::{ClosureError, InjectionToken, SchemaError, ValueError};
use thiserror::Error;

use crate::driver::CompilationState;
use crate::operation::OperationKind;

/// Raised while turning a descriptor tree into an operation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("unsupported closure for '{function}': {reason}")]
    UnsupportedClosure { function: String, reason: String },

    #[error("parameter '{param}' of '{function}' is not bound at the call site")]
    UnboundParameter { function: String, param: String },

    #[error("declaration '{function}' is never called")]
    DetachedDeclaration { function: String },

    #[error("slot '{path}' holds a {found} builder, expected {expected}")]
    SlotKind {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("slot '{path}' does not exist")]
    MissingSlot { path: String },

    #[error("slot '{path}' is already bound")]
    SlotOccupied { path: String },

    #[error("compilation already ran (state: {state:?})")]
    Reentered { state: CompilationState },

    #[error("no value provided for dependency '{token}'")]
    MissingDependency { token: InjectionToken },

    #[error("{operation} of '{field}': {source}")]
    Field {
        field: String,
        operation: OperationKind,
        #[source]
        source: Box<CompileError>,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl CompileError {
    pub fn unsupported(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedClosure {
            function: function.into(),
            reason: reason.into(),
        }
    }

    /// Innermost error, skipping field context.
    pub fn root_cause(&self) -> &CompileError {
        match self {
            CompileError::Field { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Raised while running a compiled operation.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("function '{function}' failed: {source}")]
    Closure {
        function: String,
        #[source]
        source: ClosureError,
    },

    #[error("{operation} expects {expected} arguments, got {found}")]
    Arity {
        operation: OperationKind,
        expected: usize,
        found: usize,
    },

    #[error("invalid input for {operation}: {message}")]
    InvalidInput {
        operation: OperationKind,
        message: String,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),
}
