use morphstack_schema::{PropertyKind, PropertyRef, PropertyTree};
use serde::Serialize;

use crate::canonical_log::{CanonicalLog, LogLevel};
use crate::chain::chain_for;
use crate::config::CompilerConfig;
use crate::emit::EmitContext;
use crate::error::CompileError;
use crate::linearize::linearize;
use crate::operation::OperationKind;
use crate::runtime::Program;
use crate::slots::SlotTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilationState {
    NotStarted,
    Visiting,
    Linearizing,
    Compiled,
    Failed,
}

/// Compiles one operation for one scope of descriptors.
///
/// A compilation visits every descriptor in pre-order, letting the
/// operation's handler chain emit into a fresh slot tree, then linearizes
/// the tree into a [`Program`]. Arrays of objects are not descended into:
/// their handlers compile the element schema as a separate scope.
pub struct Compilation<'t> {
    entity: &'t str,
    roots: Vec<PropertyRef<'t>>,
    kind: OperationKind,
    config: &'t CompilerConfig,
    state: CompilationState,
}

impl<'t> Compilation<'t> {
    pub fn new(tree: &'t PropertyTree, kind: OperationKind, config: &'t CompilerConfig) -> Self {
        Self {
            entity: tree.name(),
            roots: tree.roots().collect(),
            kind,
            config,
            state: CompilationState::NotStarted,
        }
    }

    pub(crate) fn scope(roots: Vec<PropertyRef<'t>>, kind: OperationKind, config: &'t CompilerConfig) -> Self {
        let entity = roots.first().map(|p| p.tree().name()).unwrap_or_default();
        Self {
            entity,
            roots,
            kind,
            config,
            state: CompilationState::NotStarted,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> CompilationState {
        self.state
    }

    #[tracing::instrument(level = "debug", skip_all, fields(entity = %self.entity, operation = %self.kind))]
    pub fn run(&mut self) -> Result<Program, CompileError> {
        if self.state != CompilationState::NotStarted {
            return Err(CompileError::Reentered { state: self.state });
        }
        let mut log = CanonicalLog::new();
        log.set("entity", self.entity)
            .set("operation", self.kind.as_str());

        let result = self.visit(&mut log).and_then(|slots| {
            self.state = CompilationState::Linearizing;
            linearize(&slots, self.kind)
        });

        match result {
            Ok(program) => {
                self.state = CompilationState::Compiled;
                log.set("state", self.state)
                    .set("params", program.params().len());
                log.emit();
                Ok(program)
            }
            Err(err) => {
                self.state = CompilationState::Failed;
                log.set("state", self.state)
                    .set("error", err.to_string())
                    .set_level(LogLevel::Warn);
                Err(err)
            }
        }
    }

    fn visit(&mut self, log: &mut CanonicalLog) -> Result<SlotTree, CompileError> {
        self.state = CompilationState::Visiting;

        let chain = chain_for(self.kind);
        let mut slots = SlotTree::new();
        let mut ctx = EmitContext::new(self.kind, &mut slots, self.config);
        chain.prepare(&mut ctx)?;

        let mut stack: Vec<PropertyRef<'t>> = self.roots.iter().rev().copied().collect();
        while let Some(prop) = stack.pop() {
            let handled = chain
                .handle(prop, &mut ctx)
                .map_err(|err| CompileError::Field {
                    field: prop.path(),
                    operation: self.kind,
                    source: Box::new(err),
                })?;
            match handled {
                Some(handler) => log.inc(handler, 1),
                None => log.inc("unclaimed", 1),
            };
            if !matches!(prop.kind(), PropertyKind::ObjectArray | PropertyKind::ScalarArray) {
                stack.extend(prop.children().rev());
            }
        }
        Ok(slots)
    }
}
