use std::sync::Arc;

use morphstack_schema::{AccessPath, Closure, Naming, PathContext, PropertyRef, Var};

use crate::config::CompilerConfig;
use crate::driver::Compilation;
use crate::error::CompileError;
use crate::hoist::{self, Hoisted};
use crate::operation::OperationKind;
use crate::runtime::{Cond, Expr, Program, Stmt};
use crate::slots::{paths, Conditional, Node, ObjectLiteral, SlotId, SlotTree};

/// What a handler sees while emitting one descriptor.
pub(crate) struct EmitContext<'a> {
    kind: OperationKind,
    tree: &'a mut SlotTree,
    config: &'a CompilerConfig,
}

impl<'a> EmitContext<'a> {
    pub(crate) fn new(kind: OperationKind, tree: &'a mut SlotTree, config: &'a CompilerConfig) -> Self {
        Self { kind, tree, config }
    }

    pub(crate) fn config(&self) -> &CompilerConfig {
        self.config
    }

    pub(crate) fn tree(&mut self) -> &mut SlotTree {
        self.tree
    }

    pub(crate) fn selector(&self, prop: PropertyRef<'_>, root: Var, naming: Naming) -> AccessPath {
        PathContext::new(prop).with_naming(naming).selector(root)
    }

    pub(crate) fn assignment(&self, prop: PropertyRef<'_>, root: Var, naming: Naming) -> AccessPath {
        PathContext::new(prop).with_naming(naming).assignment(root)
    }

    // ------------------------------------------------------------------
    // Object literals
    // ------------------------------------------------------------------

    /// The literal that receives `prop` as a member.
    fn object_for(&self, prop: PropertyRef<'_>) -> Result<SlotId, CompileError> {
        let path = paths::RESULT_OBJECT.join(&PathContext::new(prop).parent_path());
        self.tree.id(&path).ok_or_else(|| CompileError::MissingSlot {
            path: path.as_str().to_string(),
        })
    }

    pub(crate) fn property(&mut self, prop: PropertyRef<'_>, name: &str, value: Expr) -> Result<(), CompileError> {
        let id = self.object_for(prop)?;
        self.tree.by_id::<ObjectLiteral>(id)?.property(name, value);
        Ok(())
    }

    /// Finds or creates the nested literal for an object descriptor.
    pub(crate) fn nested_object(
        &mut self,
        prop: PropertyRef<'_>,
        name: &str,
        source: Option<AccessPath>,
    ) -> Result<SlotId, CompileError> {
        let parent = self.object_for(prop)?;
        let mut segments = PathContext::new(prop).parent_path();
        segments.push(prop.name().to_string());
        let path = paths::RESULT_OBJECT.join(&segments);
        self.tree.nested_object(parent, &path, name, source)
    }

    // ------------------------------------------------------------------
    // Statements and guards
    // ------------------------------------------------------------------

    /// Conditional holding the guards of descriptors below `owner`, or the
    /// top-level conditional section when there is no owner. A nested
    /// conditional is linked into its owner's presence branch on creation.
    fn conditional_for(&mut self, owner: Option<PropertyRef<'_>>) -> Result<SlotId, CompileError> {
        let Some(owner) = owner else {
            return self.tree.id(&paths::IFS).ok_or_else(|| CompileError::MissingSlot {
                path: paths::IFS.as_str().to_string(),
            });
        };
        let context = PathContext::new(owner);
        let mut segments = context.parent_path();
        segments.push(owner.name().to_string());
        let path = paths::IFS.join(&segments);
        if let Some(id) = self.tree.id(&path) {
            self.tree.peek::<Conditional>(id)?;
            return Ok(id);
        }

        let outer = self.conditional_for(context.guard_ancestor())?;
        let key = owner.scope_path();
        if self.tree.by_id::<Conditional>(outer)?.get_branch(&key).is_none() {
            return Err(CompileError::MissingSlot {
                path: format!("{}#{}", self.tree.path_of(outer), key),
            });
        }
        let id = self.tree.insert(&path, Conditional::default())?;
        if let Some(branch) = self.tree.by_id::<Conditional>(outer)?.get_branch(&key) {
            branch.append_body(Node::Slot(id));
        }
        Ok(id)
    }

    /// Opens the presence branch of a nullable or optional object. Writes
    /// below it are emitted into this branch.
    pub(crate) fn open_scope(&mut self, prop: PropertyRef<'_>, cond: Cond) -> Result<(), CompileError> {
        let outer = self.conditional_for(PathContext::new(prop).guard_ancestor())?;
        self.tree
            .by_id::<Conditional>(outer)?
            .branch(&prop.scope_path(), || cond);
        Ok(())
    }

    fn push_into_scope(&mut self, owner: PropertyRef<'_>, stmt: Stmt) -> Result<(), CompileError> {
        let outer = self.conditional_for(PathContext::new(owner).guard_ancestor())?;
        let key = owner.scope_path();
        match self.tree.by_id::<Conditional>(outer)?.get_branch(&key) {
            Some(branch) => {
                branch.append_body(Node::Stmt(stmt));
                Ok(())
            }
            None => Err(CompileError::MissingSlot {
                path: format!("{}#{}", self.tree.path_of(outer), key),
            }),
        }
    }

    /// Emits a statement that writes `prop`. Under a nullable or optional
    /// ancestor it lands in that ancestor's presence branch, otherwise in
    /// the assignment section.
    pub(crate) fn statement(&mut self, prop: PropertyRef<'_>, stmt: Stmt) -> Result<(), CompileError> {
        match PathContext::new(prop).guard_ancestor() {
            Some(owner) => self.push_into_scope(owner, stmt),
            None => {
                self.tree.get(&paths::ASSIGNMENTS)?.push(stmt);
                Ok(())
            }
        }
    }

    /// Emits a statement inside the presence branch `prop` opened itself.
    pub(crate) fn scoped_statement(&mut self, prop: PropertyRef<'_>, stmt: Stmt) -> Result<(), CompileError> {
        self.push_into_scope(prop, stmt)
    }

    /// Emits `if cond { stmt }` for `prop`, nested in its ancestors' guards.
    pub(crate) fn guarded(&mut self, prop: PropertyRef<'_>, cond: Cond, stmt: Stmt) -> Result<(), CompileError> {
        let outer = self.conditional_for(PathContext::new(prop).guard_ancestor())?;
        self.tree
            .by_id::<Conditional>(outer)?
            .branch(&prop.scope_path(), || cond)
            .append_body(Node::Stmt(stmt));
        Ok(())
    }

    pub(crate) fn computed(&mut self, stmt: Stmt) -> Result<(), CompileError> {
        self.tree.get(&paths::COMPUTED)?.push(stmt);
        Ok(())
    }

    pub(crate) fn epilogue(&mut self, stmt: Stmt) -> Result<(), CompileError> {
        self.tree.get(&paths::EPILOGUE)?.push(stmt);
        Ok(())
    }

    /// Prepends to the assignment section.
    pub(crate) fn prologue(&mut self, stmt: Stmt) -> Result<(), CompileError> {
        self.tree.get(&paths::ASSIGNMENTS)?.unshift(stmt);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Closures and element programs
    // ------------------------------------------------------------------

    pub(crate) fn hoist(&mut self, prop: PropertyRef<'_>, closure: &Closure) -> Result<Hoisted, CompileError> {
        hoist::hoist(self.tree, closure, &prop.path(), &self.config.function_prefix)
    }

    /// Compiles this operation for the elements of an array of objects.
    pub(crate) fn compile_elements(&mut self, prop: PropertyRef<'_>) -> Result<Arc<Program>, CompileError> {
        let program = Compilation::scope(prop.children().collect(), self.kind, self.config).run()?;
        self.tree
            .get(&paths::FACTORY)?
            .parameters(program.params().iter().cloned());
        Ok(Arc::new(program))
    }
}
