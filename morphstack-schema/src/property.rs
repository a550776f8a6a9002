//! Entity descriptors.
//!
//! Schemas are declared with the [`FieldDef`] builder and frozen into a
//! [`PropertyTree`], an arena of [`Property`] nodes with parent links. All
//! navigation goes through the copyable [`PropertyRef`] handle.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::closure::Closure;
use crate::error::SchemaError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    Function,
    Computed,
    Definition,
}

impl PropertyType {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyType::String => "String",
            PropertyType::Number => "Number",
            PropertyType::Boolean => "Boolean",
            PropertyType::Date => "Date",
            PropertyType::Object => "Object",
            PropertyType::Array => "Array",
            PropertyType::Function => "Function",
            PropertyType::Computed => "Computed",
            PropertyType::Definition => "Definition",
        }
    }

    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            PropertyType::String | PropertyType::Number | PropertyType::Boolean
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Participates in id comparison and in both hash modes.
    pub key: bool,
    /// Store-assigned. Never defaulted, never hashed.
    pub identity: bool,
    /// Merge copies the source value only while the destination is null.
    pub readonly: bool,
    pub nullable: bool,
    pub optional: bool,
    /// Not persisted by `prepare` and not carried by `strip`.
    pub unmapped: bool,
    /// Arrays are de-duplicated by `prepare`.
    pub distinct: bool,
}

impl Modifiers {
    pub fn may_be_absent(&self) -> bool {
        self.nullable || self.optional
    }
}

#[derive(Clone, Debug)]
pub enum DefaultValue {
    Literal(Value),
    Factory(Closure),
}

/// Builder for one field of an entity schema.
#[derive(Clone, Debug)]
pub struct FieldDef {
    name: String,
    ty: PropertyType,
    modifiers: Modifiers,
    default: Option<DefaultValue>,
    serializer: Option<Closure>,
    deserializer: Option<Closure>,
    function_body: Option<Closure>,
    indexes: Vec<String>,
    from: Option<String>,
    children: Vec<FieldDef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers: Modifiers::default(),
            default: None,
            serializer: None,
            deserializer: None,
            function_body: None,
            indexes: Vec::new(),
            from: None,
            children: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Date)
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Function)
    }

    pub fn definition(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Definition)
    }

    /// A derived field whose value is produced by `body`.
    pub fn computed(name: impl Into<String>, body: Closure) -> Self {
        let mut def = Self::new(name, PropertyType::Computed);
        def.function_body = Some(body);
        def
    }

    pub fn object(name: impl Into<String>, children: impl IntoIterator<Item = FieldDef>) -> Self {
        let mut def = Self::new(name, PropertyType::Object);
        def.children = children.into_iter().collect();
        def
    }

    /// Array of scalars.
    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Array)
    }

    /// Array whose elements follow the `children` schema.
    pub fn array_of(name: impl Into<String>, children: impl IntoIterator<Item = FieldDef>) -> Self {
        let mut def = Self::new(name, PropertyType::Array);
        def.children = children.into_iter().collect();
        def
    }

    pub fn key(mut self) -> Self {
        self.modifiers.key = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.modifiers.identity = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.modifiers.readonly = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.modifiers.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.modifiers.optional = true;
        self
    }

    pub fn unmapped(mut self) -> Self {
        self.modifiers.unmapped = true;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.modifiers.distinct = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with(mut self, factory: Closure) -> Self {
        self.default = Some(DefaultValue::Factory(factory));
        self
    }

    pub fn serialize_with(mut self, serializer: Closure) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn deserialize_with(mut self, deserializer: Closure) -> Self {
        self.deserializer = Some(deserializer);
        self
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.indexes.push(name.into());
        self
    }

    /// Storage-side name for this field.
    pub fn stored_as(mut self, stored: impl Into<String>) -> Self {
        self.from = Some(stored.into());
        self
    }

    pub fn child(mut self, def: FieldDef) -> Self {
        self.children.push(def);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u32);

impl PropertyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct Property {
    name: String,
    ty: PropertyType,
    modifiers: Modifiers,
    default: Option<DefaultValue>,
    serializer: Option<Closure>,
    deserializer: Option<Closure>,
    function_body: Option<Closure>,
    indexes: Vec<String>,
    from: Option<String>,
    parent: Option<PropertyId>,
    children: Vec<PropertyId>,
}

/// Structural classification used by operation handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Object,
    ObjectArray,
    ScalarArray,
    Date,
    Computed,
    Function,
    Scalar,
}

#[derive(Debug, Clone)]
pub struct PropertyTree {
    name: String,
    nodes: Vec<Property>,
    roots: Vec<PropertyId>,
}

impl PropertyTree {
    pub fn build(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldDef>,
    ) -> Result<Self, SchemaError> {
        let mut tree = Self {
            name: name.into(),
            nodes: Vec::new(),
            roots: Vec::new(),
        };
        let roots = tree.insert_all(None, "", fields.into_iter().collect())?;
        tree.roots = roots;
        tracing::debug!(entity = %tree.name, properties = tree.nodes.len(), "built property tree");
        Ok(tree)
    }

    fn insert_all(
        &mut self,
        parent: Option<PropertyId>,
        parent_path: &str,
        fields: Vec<FieldDef>,
    ) -> Result<Vec<PropertyId>, SchemaError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(fields.len());
        for def in fields {
            if def.name.is_empty() {
                return Err(SchemaError::EmptyName {
                    parent: parent_path.to_string(),
                });
            }
            let path = if parent_path.is_empty() {
                def.name.clone()
            } else {
                format!("{}.{}", parent_path, def.name)
            };
            if !seen.insert(def.name.clone()) {
                return Err(SchemaError::DuplicateField { path });
            }
            validate(&def, &path)?;

            let id = PropertyId(self.nodes.len() as u32);
            self.nodes.push(Property {
                name: def.name,
                ty: def.ty,
                modifiers: def.modifiers,
                default: def.default,
                serializer: def.serializer,
                deserializer: def.deserializer,
                function_body: def.function_body,
                indexes: def.indexes,
                from: def.from,
                parent,
                children: Vec::new(),
            });
            let children = self.insert_all(Some(id), &path, def.children)?;
            self.nodes[id.index()].children = children;
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: PropertyId) -> PropertyRef<'_> {
        PropertyRef { tree: self, id }
    }

    pub fn roots(&self) -> impl Iterator<Item = PropertyRef<'_>> + '_ {
        self.roots.iter().map(move |id| self.get(*id))
    }

    /// Every descriptor, parents before children.
    pub fn pre_order(&self) -> Vec<PropertyRef<'_>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<PropertyRef<'_>> = self.roots().collect();
        stack.reverse();
        while let Some(prop) = stack.pop() {
            out.push(prop);
            stack.extend(prop.children().rev());
        }
        out
    }

    /// Looks a descriptor up by dotted model path, e.g. `address.city`.
    pub fn find(&self, path: &str) -> Option<PropertyRef<'_>> {
        let mut names = path.split('.');
        let first = names.next()?;
        let mut current = self.roots().find(|p| p.name() == first)?;
        for name in names {
            current = current.children().find(|p| p.name() == name)?;
        }
        Some(current)
    }
}

fn validate(def: &FieldDef, path: &str) -> Result<(), SchemaError> {
    if def.modifiers.key && !matches!(def.ty, PropertyType::String | PropertyType::Number) {
        return Err(SchemaError::InvalidKey {
            path: path.to_string(),
            found: def.ty,
        });
    }
    if def.modifiers.identity && matches!(def.default, Some(DefaultValue::Literal(_))) {
        return Err(SchemaError::IdentityDefault {
            path: path.to_string(),
        });
    }
    if !def.children.is_empty() && !matches!(def.ty, PropertyType::Object | PropertyType::Array) {
        return Err(SchemaError::UnexpectedChildren {
            path: path.to_string(),
            found: def.ty,
        });
    }
    if def.ty == PropertyType::Computed && def.function_body.is_none() {
        return Err(SchemaError::MissingFunctionBody {
            path: path.to_string(),
        });
    }
    Ok(())
}

#[derive(Clone, Copy)]
pub struct PropertyRef<'t> {
    tree: &'t PropertyTree,
    id: PropertyId,
}

impl<'t> PropertyRef<'t> {
    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn tree(&self) -> &'t PropertyTree {
        self.tree
    }

    pub fn property(&self) -> &'t Property {
        &self.tree.nodes[self.id.index()]
    }

    pub fn name(&self) -> &'t str {
        &self.property().name
    }

    /// Name used on the storage side.
    pub fn stored_name(&self) -> &'t str {
        self.property().from.as_deref().unwrap_or(self.name())
    }

    pub fn ty(&self) -> PropertyType {
        self.property().ty
    }

    pub fn modifiers(&self) -> Modifiers {
        self.property().modifiers
    }

    pub fn default(&self) -> Option<&'t DefaultValue> {
        self.property().default.as_ref()
    }

    pub fn serializer(&self) -> Option<&'t Closure> {
        self.property().serializer.as_ref()
    }

    pub fn deserializer(&self) -> Option<&'t Closure> {
        self.property().deserializer.as_ref()
    }

    pub fn function_body(&self) -> Option<&'t Closure> {
        self.property().function_body.as_ref()
    }

    pub fn indexes(&self) -> &'t [String] {
        &self.property().indexes
    }

    pub fn is_indexed(&self) -> bool {
        !self.property().indexes.is_empty()
    }

    pub fn parent(&self) -> Option<PropertyRef<'t>> {
        self.property().parent.map(|id| self.tree.get(id))
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = PropertyRef<'t>> + 't {
        let tree = self.tree;
        self.property().children.iter().map(move |id| tree.get(*id))
    }

    pub fn has_children(&self) -> bool {
        !self.property().children.is_empty()
    }

    /// Ancestors nearest first, all the way to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = PropertyRef<'t>> {
        std::iter::successors(self.parent(), |p| p.parent())
    }

    /// Ancestors nearest first, stopping below the closest array. Elements
    /// of an array are addressed relative to the element, so the array and
    /// everything above it lie outside their scope.
    pub fn scope_ancestors(&self) -> impl Iterator<Item = PropertyRef<'t>> {
        self.ancestors().take_while(|p| p.ty() != PropertyType::Array)
    }

    /// Full dotted model path from the entity root.
    pub fn path(&self) -> String {
        let mut names: Vec<&str> = self.ancestors().map(|p| p.name()).collect();
        names.reverse();
        names.push(self.name());
        names.join(".")
    }

    /// Dotted model path relative to the enclosing scope.
    pub fn scope_path(&self) -> String {
        let mut names: Vec<&str> = self.scope_ancestors().map(|p| p.name()).collect();
        names.reverse();
        names.push(self.name());
        names.join(".")
    }

    pub fn kind(&self) -> PropertyKind {
        match self.ty() {
            PropertyType::Object => PropertyKind::Object,
            PropertyType::Array if self.has_children() => PropertyKind::ObjectArray,
            PropertyType::Array => PropertyKind::ScalarArray,
            PropertyType::Date => PropertyKind::Date,
            PropertyType::Computed => PropertyKind::Computed,
            PropertyType::Function => PropertyKind::Function,
            PropertyType::String
            | PropertyType::Number
            | PropertyType::Boolean
            | PropertyType::Definition => PropertyKind::Scalar,
        }
    }
}

impl fmt::Debug for PropertyRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRef")
            .field("path", &self.path())
            .field("ty", &self.ty())
            .finish()
    }
}

impl PartialEq for PropertyRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Result<PropertyTree, SchemaError> {
        PropertyTree::build(
            "User",
            [
                FieldDef::string("id").key().identity(),
                FieldDef::string("name"),
                FieldDef::object(
                    "address",
                    [
                        FieldDef::string("city"),
                        FieldDef::object("geo", [FieldDef::number("lat")]).nullable(),
                    ],
                ),
                FieldDef::array_of("items", [FieldDef::string("sku").stored_as("SKU")]),
            ],
        )
    }

    #[test]
    fn test_pre_order_and_paths() {
        let tree = user().unwrap();
        let paths: Vec<String> = tree.pre_order().iter().map(|p| p.path()).collect();
        assert_eq!(
            paths,
            vec![
                "id",
                "name",
                "address",
                "address.city",
                "address.geo",
                "address.geo.lat",
                "items",
                "items.sku"
            ]
        );

        let sku = tree.find("items.sku").unwrap();
        assert_eq!(sku.scope_path(), "sku");
        assert_eq!(sku.stored_name(), "SKU");
        assert_eq!(sku.scope_ancestors().count(), 0);

        let lat = tree.find("address.geo.lat").unwrap();
        assert_eq!(lat.scope_path(), "address.geo.lat");
        assert_eq!(lat.parent().unwrap().name(), "geo");
    }

    #[test]
    fn test_kinds() {
        let tree = user().unwrap();
        assert_eq!(tree.find("address").unwrap().kind(), PropertyKind::Object);
        assert_eq!(tree.find("items").unwrap().kind(), PropertyKind::ObjectArray);
        assert_eq!(tree.find("id").unwrap().kind(), PropertyKind::Scalar);
    }

    #[test]
    fn test_rejects_invalid_schemas() {
        let err = PropertyTree::build("X", [FieldDef::date("at").key()]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidKey { found: PropertyType::Date, .. }));

        let err = PropertyTree::build("X", [FieldDef::string("a"), FieldDef::number("a")])
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                path: "a".to_string()
            }
        );

        let err = PropertyTree::build("X", [FieldDef::string("id").identity().default_value("x")])
            .unwrap_err();
        assert!(matches!(err, SchemaError::IdentityDefault { .. }));

        let err = PropertyTree::build(
            "X",
            [FieldDef::string("s").child(FieldDef::number("n"))],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "field 's' of type String cannot declare children");

        let err = PropertyTree::build("X", [FieldDef::object("o", [FieldDef::string("")])])
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::EmptyName {
                parent: "o".to_string()
            }
        );
    }
}
