//! The compiled operation set of one entity class.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use morphstack_schema::{InjectionToken, PropertyTree, TrackingMode, Value};
use once_cell::sync::OnceCell;

use crate::config::CompilerConfig;
use crate::driver::Compilation;
use crate::error::{CompileError, OperationError};
use crate::operation::{HashMode, OperationKind};
use crate::runtime::{Deps, Program};

/// Supplies the values of injected dependencies.
pub trait Injector: Send + Sync {
    fn resolve(&self, token: &InjectionToken) -> Option<Value>;
}

impl Injector for HashMap<String, Value> {
    fn resolve(&self, token: &InjectionToken) -> Option<Value> {
        self.get(token.name()).cloned()
    }
}

impl Injector for BTreeMap<String, Value> {
    fn resolve(&self, token: &InjectionToken) -> Option<Value> {
        self.get(token.name()).cloned()
    }
}

/// For schemas without injected closures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

impl Injector for NoDependencies {
    fn resolve(&self, _token: &InjectionToken) -> Option<Value> {
        None
    }
}

/// A program with its dependencies bound. Cheap to clone, safe to call
/// from any thread.
#[derive(Clone)]
pub struct CompiledOperation {
    program: Arc<Program>,
    deps: Arc<Deps>,
}

impl CompiledOperation {
    pub fn kind(&self) -> OperationKind {
        self.program.kind()
    }

    pub fn params(&self) -> &[InjectionToken] {
        self.program.params()
    }

    pub fn call(&self, inputs: Vec<Value>) -> Result<Value, OperationError> {
        self.program.execute(inputs, &self.deps)
    }
}

impl fmt::Debug for CompiledOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledOperation")
            .field("kind", &self.kind())
            .field("params", &self.params())
            .finish()
    }
}

/// Every operation of an entity class. Eager operations compile in
/// [`compile`](Self::compile), the rest exactly once on first use.
pub struct EntityOperations {
    tree: Arc<PropertyTree>,
    injector: Arc<dyn Injector>,
    config: CompilerConfig,
    compiled: [OnceCell<CompiledOperation>; 11],
}

impl EntityOperations {
    pub fn compile(
        tree: Arc<PropertyTree>,
        injector: Arc<dyn Injector>,
        config: CompilerConfig,
    ) -> Result<Self, CompileError> {
        let operations = Self {
            tree,
            injector,
            config,
            compiled: Default::default(),
        };
        for kind in OperationKind::ALL {
            if operations.config.is_eager(kind) {
                operations.operation(kind)?;
            }
        }
        tracing::info!(
            entity = %operations.entity(),
            fields = operations.tree.len(),
            eager = operations.config.eager.len(),
            "compiled entity operations"
        );
        Ok(operations)
    }

    pub fn entity(&self) -> &str {
        self.tree.name()
    }

    pub fn tree(&self) -> &Arc<PropertyTree> {
        &self.tree
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn is_compiled(&self, kind: OperationKind) -> bool {
        self.compiled[kind.index()].get().is_some()
    }

    pub fn operation(&self, kind: OperationKind) -> Result<&CompiledOperation, CompileError> {
        self.compiled[kind.index()].get_or_try_init(|| {
            let program = Compilation::new(&self.tree, kind, &self.config).run()?;
            let deps = program.resolve(|token| self.injector.resolve(token))?;
            Ok(CompiledOperation {
                program: Arc::new(program),
                deps: Arc::new(deps),
            })
        })
    }

    pub fn run(&self, kind: OperationKind, inputs: Vec<Value>) -> Result<Value, OperationError> {
        Ok(self.operation(kind)?.call(inputs)?)
    }

    pub fn clone_entity(&self, entity: &Value) -> Result<Value, OperationError> {
        self.run(OperationKind::Clone, vec![entity.clone()])
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Result<bool, OperationError> {
        let out = self.run(OperationKind::Compare, vec![a.clone(), b.clone()])?;
        Ok(out.as_bool().unwrap_or(false))
    }

    pub fn compare_ids(&self, a: &Value, b: &Value) -> Result<bool, OperationError> {
        let out = self.run(OperationKind::CompareIds, vec![a.clone(), b.clone()])?;
        Ok(out.as_bool().unwrap_or(false))
    }

    pub fn hash(&self, entity: &Value, mode: HashMode) -> Result<String, OperationError> {
        match self.run(OperationKind::Hash, vec![entity.clone(), mode.into()])? {
            Value::String(digest) => Ok(digest),
            other => Err(OperationError::InvalidInput {
                operation: OperationKind::Hash,
                message: format!("expected a digest, got {}", other.type_name()),
            }),
        }
    }

    pub fn serialize(&self, entity: &Value) -> Result<Value, OperationError> {
        self.run(OperationKind::Serialize, vec![entity.clone()])
    }

    pub fn deserialize(&self, wire: &Value) -> Result<Value, OperationError> {
        self.run(OperationKind::Deserialize, vec![wire.clone()])
    }

    /// Takes the entity by value: enrichment fills it in place and installs
    /// trackers on it.
    pub fn enrich(&self, entity: Value, mode: TrackingMode) -> Result<Value, OperationError> {
        self.run(OperationKind::Enrich, vec![entity, mode.into()])
    }

    pub fn merge(&self, destination: Value, source: &Value) -> Result<Value, OperationError> {
        self.run(OperationKind::Merge, vec![destination, source.clone()])
    }

    pub fn freeze(&self, entity: Value) -> Result<Value, OperationError> {
        self.run(OperationKind::Freeze, vec![entity])
    }

    pub fn prepare(&self, entity: &Value) -> Result<Value, OperationError> {
        self.run(OperationKind::Prepare, vec![entity.clone()])
    }

    pub fn strip(&self, entity: &Value) -> Result<Value, OperationError> {
        self.run(OperationKind::Strip, vec![entity.clone()])
    }
}

impl fmt::Debug for EntityOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compiled: Vec<OperationKind> = OperationKind::ALL
            .into_iter()
            .filter(|kind| self.is_compiled(*kind))
            .collect();
        f.debug_struct("EntityOperations")
            .field("entity", &self.entity())
            .field("compiled", &compiled)
            .finish()
    }
}
