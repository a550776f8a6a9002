//! Access paths from an operation variable to a descriptor's value.

use std::fmt;

use crate::property::{PropertyRef, PropertyType};

/// Named roots available inside a compiled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Var {
    Entity,
    Result,
    Enriched,
    Source,
    Destination,
    A,
    B,
    Mode,
}

impl Var {
    pub fn as_str(self) -> &'static str {
        match self {
            Var::Entity => "entity",
            Var::Result => "result",
            Var::Enriched => "enriched",
            Var::Source => "source",
            Var::Destination => "destination",
            Var::A => "a",
            Var::B => "b",
            Var::Mode => "mode",
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which name a descriptor contributes to a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Naming {
    #[default]
    Model,
    /// The `from` mapping, falling back to the model name.
    Stored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    /// The preceding value may be null or absent.
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPath {
    root: Var,
    segments: Vec<Segment>,
}

impl AccessPath {
    pub fn new(root: Var) -> Self {
        Self {
            root,
            segments: Vec::new(),
        }
    }

    pub fn root(&self) -> Var {
        self.root
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments.iter().map(|s| s.name.as_str())
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(mut self, name: impl Into<String>, optional: bool) -> Self {
        self.segments.push(Segment {
            name: name.into(),
            optional,
        });
        self
    }

    /// Path to the containing object, or `None` at the root.
    pub fn parent(&self) -> Option<AccessPath> {
        let (_, parents) = self.segments.split_last()?;
        Some(AccessPath {
            root: self.root,
            segments: parents.to_vec(),
        })
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            let sep = if segment.optional { "?." } else { "." };
            write!(f, "{}{}", sep, segment.name)?;
        }
        Ok(())
    }
}

/// Path resolution for one descriptor.
///
/// Scopes end at array boundaries: a descriptor inside an array of objects
/// is addressed relative to the element.
#[derive(Debug, Clone, Copy)]
pub struct PathContext<'t> {
    prop: PropertyRef<'t>,
    naming: Naming,
}

impl<'t> PathContext<'t> {
    pub fn new(prop: PropertyRef<'t>) -> Self {
        Self {
            prop,
            naming: Naming::Model,
        }
    }

    pub fn with_naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    fn name_of(&self, prop: PropertyRef<'t>) -> &'t str {
        match self.naming {
            Naming::Model => prop.name(),
            Naming::Stored => prop.stored_name(),
        }
    }

    /// Scope ancestors root first, followed by the descriptor itself.
    fn chain(&self) -> Vec<PropertyRef<'t>> {
        let mut chain: Vec<PropertyRef<'t>> = self.prop.scope_ancestors().collect();
        chain.reverse();
        chain.push(self.prop);
        chain
    }

    /// Read path. A segment is optional when the descriptor before it may be
    /// null or absent. A root-level descriptor never needs chaining.
    pub fn selector(&self, root: Var) -> AccessPath {
        let mut path = AccessPath::new(root);
        let mut previous_may_be_absent = false;
        for prop in self.chain() {
            path = path.child(self.name_of(prop), previous_may_be_absent);
            previous_may_be_absent = prop.modifiers().may_be_absent();
        }
        path
    }

    /// Write path. Writes happen inside guards, so no segment is optional.
    pub fn assignment(&self, root: Var) -> AccessPath {
        self.chain()
            .into_iter()
            .fold(AccessPath::new(root), |path, prop| path.child(self.name_of(prop), false))
    }

    /// Names of the scope ancestors, root first. Always model names.
    pub fn parent_path(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .prop
            .scope_ancestors()
            .map(|p| p.name().to_string())
            .collect();
        names.reverse();
        names
    }

    /// True when any scope ancestor is nullable or optional.
    pub fn has_nullable_parents(&self) -> bool {
        self.prop
            .scope_ancestors()
            .any(|p| p.modifiers().may_be_absent())
    }

    /// Nearest nullable or optional object ancestor in scope. Statements
    /// that write below it must run inside its presence guard.
    pub fn guard_ancestor(&self) -> Option<PropertyRef<'t>> {
        self.prop
            .scope_ancestors()
            .find(|p| p.ty() == PropertyType::Object && p.modifiers().may_be_absent())
    }
}
