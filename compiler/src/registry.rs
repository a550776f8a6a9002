use std::sync::Arc;

use dashmap::DashMap;
use morphstack_schema::PropertyTree;
use once_cell::sync::Lazy;

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::operations::{EntityOperations, Injector};

static GLOBAL: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::new);

/// Compiled operation sets by entity name. Storage plugins look operations
/// up here instead of holding on to schema definitions.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: DashMap<String, Arc<EntityOperations>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Process-wide registry.
    pub fn global() -> &'static SchemaRegistry {
        &GLOBAL
    }

    /// Registers an operation set under its entity name, replacing any
    /// previous one.
    pub fn register(&self, operations: EntityOperations) -> Arc<EntityOperations> {
        let name = operations.entity().to_string();
        let operations = Arc::new(operations);
        if self
            .entries
            .insert(name.clone(), Arc::clone(&operations))
            .is_some()
        {
            tracing::warn!(entity = %name, "replaced registered entity operations");
        } else {
            tracing::debug!(entity = %name, "registered entity operations");
        }
        operations
    }

    /// Compiles and registers in one step.
    pub fn compile(
        &self,
        tree: Arc<PropertyTree>,
        injector: Arc<dyn Injector>,
        config: CompilerConfig,
    ) -> Result<Arc<EntityOperations>, CompileError> {
        let operations = EntityOperations::compile(tree, injector, config)?;
        Ok(self.register(operations))
    }

    pub fn get(&self, entity: &str) -> Option<Arc<EntityOperations>> {
        self.entries.get(entity).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, entity: &str) -> Option<Arc<EntityOperations>> {
        self.entries.remove(entity).map(|(_, operations)| operations)
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entries.contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered entity names, sorted.
    pub fn entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::NoDependencies;
    use morphstack_schema::FieldDef;

    fn compile(registry: &SchemaRegistry, name: &str) -> Arc<EntityOperations> {
        let tree = PropertyTree::build(name, [FieldDef::string("id").key()]).unwrap();
        registry
            .compile(Arc::new(tree), Arc::new(NoDependencies), CompilerConfig::lazy())
            .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        compile(&registry, "User");
        compile(&registry, "Order");
        assert_eq!(registry.entities(), vec!["Order", "User"]);
        assert!(registry.contains("User"));
        assert_eq!(registry.get("User").unwrap().entity(), "User");
        assert!(registry.get("Missing").is_none());
    }

    #[test]
    fn test_replace_and_remove() {
        let registry = SchemaRegistry::new();
        let first = compile(&registry, "User");
        let second = compile(&registry, "User");
        assert_eq!(registry.len(), 1);
        assert!(!Arc::ptr_eq(&first, &registry.get("User").unwrap()));
        assert!(Arc::ptr_eq(&second, &registry.remove("User").unwrap()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_global_is_shared() {
        compile(SchemaRegistry::global(), "GlobalProbe");
        assert!(std::ptr::eq(SchemaRegistry::global(), &*GLOBAL));
        assert!(SchemaRegistry::global().remove("GlobalProbe").is_some());
    }
}
