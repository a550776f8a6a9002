//! Slot tree: the intermediate representation handlers write into.
//!
//! Slots are builders stored in an arena and addressed by dotted path. A
//! handler asks for a slot by a typed [`SlotPath`]. The slot is created on
//! first request and found again by later requests, and asking for it with
//! the wrong builder kind is an error. Builders reference child slots by
//! [`SlotId`], so the arena is a tree that linearization walks from the
//! factory root.

use std::borrow::Cow;
use std::collections::HashMap;
use std::marker::PhantomData;

use morphstack_schema::{AccessPath, InjectionToken, Var};

use crate::error::CompileError;
use crate::runtime::{Cond, Expr, Fragment, Stmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlotId(usize);

pub(crate) enum Node {
    Stmt(Stmt),
    Slot(SlotId),
}

// ============================================================================
// Builders
// ============================================================================

/// Ordered statements.
#[derive(Default)]
pub(crate) struct Block {
    nodes: Vec<Node>,
}

impl Block {
    pub(crate) fn push(&mut self, stmt: Stmt) {
        self.nodes.push(Node::Stmt(stmt));
    }

    pub(crate) fn unshift(&mut self, stmt: Stmt) {
        self.nodes.insert(0, Node::Stmt(stmt));
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

pub(crate) struct Branch {
    key: String,
    cond: Cond,
    body: Vec<Node>,
}

impl Branch {
    pub(crate) fn append_body(&mut self, node: Node) -> &mut Self {
        self.body.push(node);
        self
    }

    pub(crate) fn unshift_body(&mut self, node: Node) -> &mut Self {
        self.body.insert(0, node);
        self
    }

    pub(crate) fn cond(&self) -> &Cond {
        &self.cond
    }

    pub(crate) fn body(&self) -> &[Node] {
        &self.body
    }
}

/// A sequence of independent `if` blocks, one per key. Every branch whose
/// condition holds runs, in insertion order.
#[derive(Default)]
pub(crate) struct Conditional {
    branches: Vec<Branch>,
}

impl Conditional {
    /// Finds the branch for `key`, creating it with `cond` on first use.
    pub(crate) fn branch(&mut self, key: &str, cond: impl FnOnce() -> Cond) -> &mut Branch {
        let index = match self.branches.iter().position(|b| b.key == key) {
            Some(index) => index,
            None => {
                self.branches.push(Branch {
                    key: key.to_string(),
                    cond: cond(),
                    body: Vec::new(),
                });
                self.branches.len() - 1
            }
        };
        &mut self.branches[index]
    }

    pub(crate) fn get_branch(&mut self, key: &str) -> Option<&mut Branch> {
        self.branches.iter_mut().find(|b| b.key == key)
    }

    pub(crate) fn branches(&self) -> &[Branch] {
        &self.branches
    }
}

pub(crate) enum Member {
    Property {
        name: String,
        value: Expr,
    },
    /// A nested literal. When `source` is set the nested object is only
    /// built if the source holds an object. Any other source value is
    /// copied as is, and an absent source omits the member.
    Nested {
        name: String,
        slot: SlotId,
        source: Option<AccessPath>,
    },
}

#[derive(Default)]
pub(crate) struct ObjectLiteral {
    members: Vec<Member>,
}

impl ObjectLiteral {
    pub(crate) fn property(&mut self, name: impl Into<String>, value: Expr) {
        self.members.push(Member::Property {
            name: name.into(),
            value,
        });
    }

    pub(crate) fn members(&self) -> &[Member] {
        &self.members
    }
}

pub(crate) struct Template {
    separator: String,
    parts: Vec<Fragment>,
}

impl Template {
    pub(crate) fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            parts: Vec::new(),
        }
    }

    pub(crate) fn append(&mut self, fragment: Fragment) {
        self.parts.push(fragment);
    }

    pub(crate) fn separator(&self) -> &str {
        &self.separator
    }

    pub(crate) fn parts(&self) -> &[Fragment] {
        &self.parts
    }
}

/// Conjunction of boolean terms. Empty means true.
#[derive(Default)]
pub(crate) struct AndChain {
    terms: Vec<Cond>,
}

impl AndChain {
    pub(crate) fn and(&mut self, cond: Cond) {
        self.terms.push(cond);
    }

    pub(crate) fn terms(&self) -> &[Cond] {
        &self.terms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeclId(usize);

pub(crate) struct Declaration {
    name: String,
    attached: bool,
}

impl Declaration {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached
    }
}

/// Registry of hoisted function declarations.
#[derive(Default)]
pub(crate) struct Container {
    declarations: Vec<Declaration>,
}

impl Container {
    pub(crate) fn declare(&mut self, name: String) -> DeclId {
        self.declarations.push(Declaration {
            name,
            attached: false,
        });
        DeclId(self.declarations.len() - 1)
    }

    pub(crate) fn attach(&mut self, id: DeclId) {
        if let Some(decl) = self.declarations.get_mut(id.0) {
            decl.attached = true;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.declarations.len()
    }

    pub(crate) fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }
}

pub(crate) enum Init {
    /// Evaluate an object literal.
    Literal(SlotId),
    /// Move another variable's value.
    Move(Var),
}

pub(crate) enum Ret {
    Var(Var),
    Expr(Expr),
    And(SlotId),
    Hash { ids: SlotId, object: SlotId },
}

/// Root of an operation: parameters, variables, sections and the return.
#[derive(Default)]
pub(crate) struct FunctionFactory {
    params: Vec<InjectionToken>,
    variables: Vec<(Var, Init)>,
    sections: Vec<SlotId>,
    declarations: Option<SlotId>,
    ret: Option<Ret>,
}

impl FunctionFactory {
    /// Adds dependency parameters, skipping tokens already present.
    pub(crate) fn parameters(&mut self, tokens: impl IntoIterator<Item = InjectionToken>) {
        for token in tokens {
            if !self.params.contains(&token) {
                self.params.push(token);
            }
        }
    }

    pub(crate) fn variable(&mut self, var: Var, init: Init) {
        self.variables.push((var, init));
    }

    pub(crate) fn returns(&mut self, ret: Ret) {
        self.ret = Some(ret);
    }

    pub(crate) fn params(&self) -> &[InjectionToken] {
        &self.params
    }

    pub(crate) fn variables(&self) -> &[(Var, Init)] {
        &self.variables
    }

    pub(crate) fn sections(&self) -> &[SlotId] {
        &self.sections
    }

    pub(crate) fn declarations(&self) -> Option<SlotId> {
        self.declarations
    }

    pub(crate) fn ret(&self) -> Option<&Ret> {
        self.ret.as_ref()
    }
}

// ============================================================================
// Arena
// ============================================================================

pub(crate) enum Slot {
    Block(Block),
    Conditional(Conditional),
    ObjectLiteral(ObjectLiteral),
    Template(Template),
    AndChain(AndChain),
    Container(Container),
    FunctionFactory(FunctionFactory),
}

pub(crate) trait SlotKind: Sized + 'static {
    const NAME: &'static str;
    fn wrap(self) -> Slot;
    fn peek(slot: &Slot) -> Option<&Self>;
    fn peek_mut(slot: &mut Slot) -> Option<&mut Self>;
}

macro_rules! slot_kinds {
    ($($ty:ident),* $(,)?) => {
        $(
            impl SlotKind for $ty {
                const NAME: &'static str = stringify!($ty);

                fn wrap(self) -> Slot {
                    Slot::$ty(self)
                }

                fn peek(slot: &Slot) -> Option<&Self> {
                    match slot {
                        Slot::$ty(builder) => Some(builder),
                        _ => None,
                    }
                }

                fn peek_mut(slot: &mut Slot) -> Option<&mut Self> {
                    match slot {
                        Slot::$ty(builder) => Some(builder),
                        _ => None,
                    }
                }
            }
        )*

        impl Slot {
            fn kind_name(&self) -> &'static str {
                match self {
                    $(Slot::$ty(_) => stringify!($ty),)*
                }
            }
        }
    };
}

slot_kinds!(
    Block,
    Conditional,
    ObjectLiteral,
    Template,
    AndChain,
    Container,
    FunctionFactory,
);

/// A slot address tagged with the builder kind it must hold.
pub(crate) struct SlotPath<K> {
    path: Cow<'static, str>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> SlotPath<K> {
    pub(crate) const fn new(path: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(path),
            _kind: PhantomData,
        }
    }

    pub(crate) fn join<S: AsRef<str>>(&self, segments: &[S]) -> SlotPath<K> {
        let mut path = self.path.to_string();
        for segment in segments {
            path.push('.');
            path.push_str(segment.as_ref());
        }
        SlotPath {
            path: Cow::Owned(path),
            _kind: PhantomData,
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.path
    }
}

impl<K> Clone for SlotPath<K> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _kind: PhantomData,
        }
    }
}

pub(crate) mod paths {
    use super::*;

    pub(crate) const FACTORY: SlotPath<FunctionFactory> = SlotPath::new("factory");
    pub(crate) const DECLARATIONS: SlotPath<Container> = SlotPath::new("factory.declarations");
    pub(crate) const ASSIGNMENTS: SlotPath<Block> = SlotPath::new("factory.function.assignments");
    pub(crate) const IFS: SlotPath<Conditional> = SlotPath::new("factory.function.ifs");
    pub(crate) const COMPUTED: SlotPath<Block> = SlotPath::new("factory.function.computed");
    pub(crate) const EPILOGUE: SlotPath<Block> = SlotPath::new("factory.function.epilogue");
    pub(crate) const RESULT_OBJECT: SlotPath<ObjectLiteral> = SlotPath::new("result.variable.object");
    pub(crate) const COMPARE_AND: SlotPath<AndChain> = SlotPath::new("compare.and");
    pub(crate) const HASH_IDS: SlotPath<Template> = SlotPath::new("hash.template.ids");
    pub(crate) const HASH_OBJECT: SlotPath<Template> = SlotPath::new("hash.template.object");
}

#[derive(Default)]
pub(crate) struct SlotTree {
    slots: Vec<Slot>,
    paths: Vec<String>,
    index: HashMap<String, SlotId>,
}

impl SlotTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates the factory with its standard sections, in execution order.
    pub(crate) fn install_factory(&mut self) -> Result<SlotId, CompileError> {
        let factory = self.insert(&paths::FACTORY, FunctionFactory::default())?;
        let declarations = self.insert(&paths::DECLARATIONS, Container::default())?;
        let sections = vec![
            self.insert(&paths::ASSIGNMENTS, Block::default())?,
            self.insert(&paths::IFS, Conditional::default())?,
            self.insert(&paths::COMPUTED, Block::default())?,
            self.insert(&paths::EPILOGUE, Block::default())?,
        ];
        let root = self.by_id::<FunctionFactory>(factory)?;
        root.declarations = Some(declarations);
        root.sections = sections;
        Ok(factory)
    }

    pub(crate) fn insert<K: SlotKind>(&mut self, path: &SlotPath<K>, builder: K) -> Result<SlotId, CompileError> {
        if self.index.contains_key(path.as_str()) {
            return Err(CompileError::SlotOccupied {
                path: path.as_str().to_string(),
            });
        }
        let id = SlotId(self.slots.len());
        self.slots.push(builder.wrap());
        self.paths.push(path.as_str().to_string());
        self.index.insert(path.as_str().to_string(), id);
        Ok(id)
    }

    pub(crate) fn id<K>(&self, path: &SlotPath<K>) -> Option<SlotId> {
        self.index.get(path.as_str()).copied()
    }

    /// Returns the builder at `path`, which must exist.
    pub(crate) fn get<K: SlotKind>(&mut self, path: &SlotPath<K>) -> Result<&mut K, CompileError> {
        let id = self.id(path).ok_or_else(|| CompileError::MissingSlot {
            path: path.as_str().to_string(),
        })?;
        self.by_id(id)
    }

    pub(crate) fn by_id<K: SlotKind>(&mut self, id: SlotId) -> Result<&mut K, CompileError> {
        let SlotTree { slots, paths, .. } = self;
        let slot = &mut slots[id.0];
        let found = slot.kind_name();
        K::peek_mut(slot).ok_or_else(|| CompileError::SlotKind {
            path: paths[id.0].clone(),
            expected: K::NAME,
            found,
        })
    }

    pub(crate) fn peek<K: SlotKind>(&self, id: SlotId) -> Result<&K, CompileError> {
        let slot = &self.slots[id.0];
        K::peek(slot).ok_or_else(|| CompileError::SlotKind {
            path: self.paths[id.0].clone(),
            expected: K::NAME,
            found: slot.kind_name(),
        })
    }

    /// Finds or creates the nested literal `name` under `parent`.
    pub(crate) fn nested_object(
        &mut self,
        parent: SlotId,
        path: &SlotPath<ObjectLiteral>,
        name: &str,
        source: Option<AccessPath>,
    ) -> Result<SlotId, CompileError> {
        if let Some(id) = self.id(path) {
            self.peek::<ObjectLiteral>(id)?;
            return Ok(id);
        }
        let child = self.insert(path, ObjectLiteral::default())?;
        self.by_id::<ObjectLiteral>(parent)?
            .members
            .push(Member::Nested {
                name: name.to_string(),
                slot: child,
                source,
            });
        Ok(child)
    }

    pub(crate) fn path_of(&self, id: SlotId) -> &str {
        &self.paths[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_slots_are_inserted_once() {
        let mut tree = SlotTree::new();
        let a = tree.insert(&paths::COMPARE_AND, AndChain::default()).unwrap();
        assert_eq!(tree.id(&paths::COMPARE_AND), Some(a));
        assert!(matches!(
            tree.insert(&paths::COMPARE_AND, AndChain::default()),
            Err(CompileError::SlotOccupied { .. })
        ));
        tree.get(&paths::COMPARE_AND)
            .unwrap()
            .and(Arc::new(|_| Ok(true)));
        assert_eq!(tree.peek::<AndChain>(a).unwrap().terms().len(), 1);
    }

    #[test]
    fn test_kind_mismatch() {
        let mut tree = SlotTree::new();
        tree.install_factory().unwrap();
        let wrong: SlotPath<Block> = SlotPath::new("factory.function.ifs");
        let err = tree.get(&wrong).err().unwrap();
        assert!(matches!(
            err,
            CompileError::SlotKind {
                expected: "Block",
                found: "Conditional",
                ..
            }
        ));
        assert!(matches!(
            tree.get(&paths::RESULT_OBJECT),
            Err(CompileError::MissingSlot { .. })
        ));
        assert_eq!(tree.id(&paths::RESULT_OBJECT), None);
    }

    #[test]
    fn test_nested_objects_are_shared() {
        let mut tree = SlotTree::new();
        let root = tree
            .insert(&paths::RESULT_OBJECT, ObjectLiteral::default())
            .unwrap();
        let path = paths::RESULT_OBJECT.join(&["address"]);
        let first = tree.nested_object(root, &path, "address", None).unwrap();
        let second = tree.nested_object(root, &path, "address", None).unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.peek::<ObjectLiteral>(root).unwrap().members().len(), 1);
        assert_eq!(tree.path_of(first), "result.variable.object.address");
    }

    #[test]
    fn test_branch_body_order() {
        let mut ifs = Conditional::default();
        ifs.branch("name", || Arc::new(|_| Ok(true)))
            .append_body(Node::Slot(SlotId(1)))
            .unshift_body(Node::Slot(SlotId(0)));
        // a second request reuses the branch and keeps its condition
        ifs.branch("name", || Arc::new(|_| Ok(false)))
            .append_body(Node::Slot(SlotId(2)));

        assert_eq!(ifs.branches().len(), 1);
        let order: Vec<usize> = ifs
            .get_branch("name")
            .unwrap()
            .body()
            .iter()
            .map(|node| match node {
                Node::Slot(id) => id.0,
                Node::Stmt(_) => usize::MAX,
            })
            .collect();
        assert_eq!(order, [0, 1, 2]);
    }

    #[test]
    fn test_factory_dedupes_parameters() {
        let mut factory = FunctionFactory::default();
        let clock = InjectionToken::new("clock");
        factory.parameters([clock.clone(), InjectionToken::new("ids")]);
        factory.parameters([clock]);
        assert_eq!(factory.params().len(), 2);
    }
}
