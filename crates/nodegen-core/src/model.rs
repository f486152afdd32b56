//! Input model: interface specs, their property declarations and type descriptors

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NodegenError, ValidationError};
use crate::order::{self, Orderable};

/// Identity of an interface spec (usually a fully qualified type name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecId(String);

impl SpecId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of a dotted identity, e.g. `BinaryTree` for `tree.expr.BinaryTree`
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SpecId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SpecId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SpecId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Logical name of a property, which doubles as its field name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(String);

impl PropertyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PropertyId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PropertyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PropertyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ordering semantics of a collection-typed property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionOrdering {
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeShape {
    /// Value type compared with `==`, never null-checked
    Primitive,
    /// Any non-collection reference type
    Reference,
    Collection(CollectionOrdering),
}

const PRIMITIVE_NAMES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "bool", "u8", "u16",
    "u32", "u64", "u128", "usize", "i8", "i16", "i32", "i64", "i128", "isize", "f32", "f64",
];

const ORDERED_COLLECTIONS: &[&str] = &["java.util.List", "List", "Vec", "VecDeque"];
const UNORDERED_COLLECTIONS: &[&str] = &["java.util.Set", "Set", "HashSet", "BTreeSet"];

/// Declared type of a property as handed over by the extraction layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub shape: TypeShape,
    #[serde(default)]
    pub non_null: bool,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            non_null: false,
        }
    }

    pub fn primitive(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::Primitive)
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::Reference)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::Collection(CollectionOrdering::Ordered))
    }

    pub fn set(name: impl Into<String>) -> Self {
        Self::new(name, TypeShape::Collection(CollectionOrdering::Unordered))
    }

    /// Mark the type as carrying a non-null annotation
    pub fn non_null(mut self) -> Self {
        self.non_null = true;
        self
    }

    /// Guess the shape of a textual type name.
    ///
    /// Generic arguments are ignored when matching collection names, so
    /// `java.util.List<Tree>` and `Vec<Node>` are both ordered collections.
    pub fn infer(name: impl Into<String>) -> Self {
        let name = name.into();
        let raw = name.split('<').next().unwrap_or(&name).trim();
        let shape = if PRIMITIVE_NAMES.contains(&raw) {
            TypeShape::Primitive
        } else if ORDERED_COLLECTIONS.contains(&raw) {
            TypeShape::Collection(CollectionOrdering::Ordered)
        } else if UNORDERED_COLLECTIONS.contains(&raw) {
            TypeShape::Collection(CollectionOrdering::Unordered)
        } else {
            TypeShape::Reference
        };
        Self::new(name, shape)
    }

    pub fn is_primitive(&self) -> bool {
        self.shape == TypeShape::Primitive
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.shape, TypeShape::Collection(_))
    }

    pub fn collection_ordering(&self) -> Option<CollectionOrdering> {
        match self.shape {
            TypeShape::Collection(ordering) => Some(ordering),
            _ => None,
        }
    }

    /// Whether an accessor returning `self` can narrow one returning `parent`.
    ///
    /// Only the primitive/non-primitive boundary is checked; subtyping between
    /// reference types belongs to the host compiler.
    pub fn can_narrow(&self, parent: &TypeDescriptor) -> bool {
        self.is_primitive() == parent.is_primitive()
            && (!self.is_primitive() || self.name == parent.name)
    }

    /// Whether the generated constructor must null-check this value
    pub fn requires_null_check(&self) -> bool {
        self.non_null && !self.is_primitive()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.non_null {
            write!(f, "@NonNull {}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// The role marker carried by a member declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyRole {
    Property,
    Child,
    Children,
}

impl fmt::Display for PropertyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyRole::Property => write!(f, "Property"),
            PropertyRole::Child => write!(f, "Child"),
            PropertyRole::Children => write!(f, "Children"),
        }
    }
}

/// Relative placement of a property among its siblings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingConstraints {
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub last: bool,
    /// Ids this property must precede
    #[serde(default)]
    pub before: BTreeSet<PropertyId>,
    /// Ids this property must follow
    #[serde(default)]
    pub after: BTreeSet<PropertyId>,
}

impl OrderingConstraints {
    pub fn is_empty(&self) -> bool {
        !self.first && !self.last && self.before.is_empty() && self.after.is_empty()
    }
}

fn default_true() -> bool {
    true
}

/// A single getter-shaped member of an interface spec.
///
/// Declarations are immutable once built; the `with_*` methods consume and
/// return the value so they can only be used while constructing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDeclaration {
    id: PropertyId,
    #[serde(rename = "type")]
    ty: TypeDescriptor,
    role: PropertyRole,
    #[serde(rename = "override", default)]
    is_override: bool,
    #[serde(default = "default_true")]
    hash: bool,
    #[serde(default = "default_true")]
    equivalence: bool,
    #[serde(default)]
    optional: bool,
    #[serde(default, skip_serializing_if = "OrderingConstraints::is_empty")]
    ordering: OrderingConstraints,
}

impl PropertyDeclaration {
    pub fn new(id: impl Into<PropertyId>, ty: TypeDescriptor, role: PropertyRole) -> Self {
        Self {
            id: id.into(),
            ty,
            role,
            is_override: false,
            hash: true,
            equivalence: true,
            optional: false,
            ordering: OrderingConstraints::default(),
        }
    }

    pub fn property(id: impl Into<PropertyId>, ty: TypeDescriptor) -> Self {
        Self::new(id, ty, PropertyRole::Property)
    }

    pub fn child(id: impl Into<PropertyId>, ty: TypeDescriptor) -> Self {
        Self::new(id, ty, PropertyRole::Child)
    }

    pub fn children(id: impl Into<PropertyId>, ty: TypeDescriptor) -> Self {
        Self::new(id, ty, PropertyRole::Children)
    }

    pub fn with_override(mut self, is_override: bool) -> Self {
        self.is_override = is_override;
        self
    }

    pub fn with_hash(mut self, hash: bool) -> Self {
        self.hash = hash;
        self
    }

    pub fn with_equivalence(mut self, equivalence: bool) -> Self {
        self.equivalence = equivalence;
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_ordering(mut self, ordering: OrderingConstraints) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn first(mut self) -> Self {
        self.ordering.first = true;
        self
    }

    pub fn last(mut self) -> Self {
        self.ordering.last = true;
        self
    }

    pub fn before(mut self, id: impl Into<PropertyId>) -> Self {
        self.ordering.before.insert(id.into());
        self
    }

    pub fn after(mut self, id: impl Into<PropertyId>) -> Self {
        self.ordering.after.insert(id.into());
        self
    }

    pub fn id(&self) -> &PropertyId {
        &self.id
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn role(&self) -> PropertyRole {
        self.role
    }

    pub fn is_override(&self) -> bool {
        self.is_override
    }

    pub fn participates_in_hash(&self) -> bool {
        self.hash
    }

    pub fn participates_in_equivalence(&self) -> bool {
        self.equivalence
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn ordering(&self) -> &OrderingConstraints {
        &self.ordering
    }
}

impl Orderable for PropertyDeclaration {
    type Name = PropertyId;

    fn order_name(&self) -> PropertyId {
        self.id.clone()
    }

    fn is_first(&self) -> bool {
        self.ordering.first
    }

    fn is_last(&self) -> bool {
        self.ordering.last
    }

    fn before(&self) -> Vec<PropertyId> {
        self.ordering.before.iter().cloned().collect()
    }

    fn after(&self) -> Vec<PropertyId> {
        self.ordering.after.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecKind {
    /// Interface only, never implemented directly
    NoImpl,
    /// Abstract data type; also used for synthesized placeholders
    Adt,
    /// Gets a synthesized implementation
    Impl,
}

impl fmt::Display for SpecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecKind::NoImpl => write!(f, "NO_IMPL"),
            SpecKind::Adt => write!(f, "ADT"),
            SpecKind::Impl => write!(f, "IMPL"),
        }
    }
}

#[derive(Deserialize)]
struct RawInterfaceSpec {
    id: SpecId,
    kind: SpecKind,
    #[serde(default)]
    parents: Vec<SpecId>,
    #[serde(default)]
    properties: Vec<PropertyDeclaration>,
}

impl TryFrom<RawInterfaceSpec> for InterfaceSpec {
    type Error = ValidationError;

    fn try_from(raw: RawInterfaceSpec) -> Result<Self, Self::Error> {
        InterfaceSpec::new(raw.id, raw.kind, raw.parents, raw.properties)
    }
}

/// One annotated interface describing a node shape in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInterfaceSpec")]
pub struct InterfaceSpec {
    id: SpecId,
    kind: SpecKind,
    parents: Vec<SpecId>,
    properties: Vec<PropertyDeclaration>,
}

fn check_unique(spec: &SpecId, properties: &[PropertyDeclaration]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for property in properties {
        if !seen.insert(property.id()) {
            return Err(ValidationError::DuplicateProperty {
                spec: spec.clone(),
                property: property.id().clone(),
            });
        }
    }
    Ok(())
}

impl InterfaceSpec {
    /// Build a spec whose properties are already in their final order
    pub fn new(
        id: impl Into<SpecId>,
        kind: SpecKind,
        parents: Vec<SpecId>,
        properties: Vec<PropertyDeclaration>,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        check_unique(&id, &properties)?;
        Ok(Self {
            id,
            kind,
            parents,
            properties,
        })
    }

    /// Build a spec and sort its properties by their ordering constraints
    pub fn with_ordering(
        id: impl Into<SpecId>,
        kind: SpecKind,
        parents: Vec<SpecId>,
        properties: Vec<PropertyDeclaration>,
    ) -> Result<Self, NodegenError> {
        let id = id.into();
        check_unique(&id, &properties)?;
        let sorted = order::sort(properties)?;
        Ok(Self {
            id,
            kind,
            parents,
            properties: sorted,
        })
    }

    pub fn builder(id: impl Into<SpecId>, kind: SpecKind) -> InterfaceSpecBuilder {
        InterfaceSpecBuilder {
            id: id.into(),
            kind,
            parents: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn id(&self) -> &SpecId {
        &self.id
    }

    pub fn kind(&self) -> SpecKind {
        self.kind
    }

    pub fn parents(&self) -> &[SpecId] {
        &self.parents
    }

    pub fn properties(&self) -> &[PropertyDeclaration] {
        &self.properties
    }

    pub fn property(&self, id: &str) -> Option<&PropertyDeclaration> {
        self.properties.iter().find(|p| p.id().as_str() == id)
    }
}

/// Builder pattern for constructing specs by hand
pub struct InterfaceSpecBuilder {
    id: SpecId,
    kind: SpecKind,
    parents: Vec<SpecId>,
    properties: Vec<PropertyDeclaration>,
}

impl InterfaceSpecBuilder {
    pub fn parent(mut self, parent: impl Into<SpecId>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn property(mut self, property: PropertyDeclaration) -> Self {
        self.properties.push(property);
        self
    }

    pub fn build(self) -> Result<InterfaceSpec, ValidationError> {
        InterfaceSpec::new(self.id, self.kind, self.parents, self.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name() {
        assert_eq!(SpecId::new("tree.expr.BinaryTree").simple_name(), "BinaryTree");
        assert_eq!(SpecId::new("Tree").simple_name(), "Tree");
    }

    #[test]
    fn test_infer_shapes() {
        assert!(TypeDescriptor::infer("int").is_primitive());
        assert_eq!(
            TypeDescriptor::infer("java.util.List<ExpressionTree>").collection_ordering(),
            Some(CollectionOrdering::Ordered)
        );
        assert_eq!(
            TypeDescriptor::infer("BTreeSet<Modifier>").collection_ordering(),
            Some(CollectionOrdering::Unordered)
        );
        assert_eq!(TypeDescriptor::infer("String").shape, TypeShape::Reference);
    }

    #[test]
    fn test_null_check_skips_primitives() {
        assert!(!TypeDescriptor::primitive("int").non_null().requires_null_check());
        assert!(TypeDescriptor::reference("Tree").non_null().requires_null_check());
        assert!(!TypeDescriptor::reference("Tree").requires_null_check());
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let result = InterfaceSpec::builder("a.Node", SpecKind::Impl)
            .property(PropertyDeclaration::property("x", TypeDescriptor::primitive("int")))
            .property(PropertyDeclaration::child("x", TypeDescriptor::reference("Tree")))
            .build();

        assert!(matches!(
            result,
            Err(ValidationError::DuplicateProperty { ref property, .. }) if property.as_str() == "x"
        ));
    }

    #[test]
    fn test_with_ordering_sorts_properties() {
        let spec = InterfaceSpec::with_ordering(
            "a.Node",
            SpecKind::Impl,
            vec![],
            vec![
                PropertyDeclaration::property("b", TypeDescriptor::primitive("int")),
                PropertyDeclaration::property("a", TypeDescriptor::primitive("int")).before("b"),
                PropertyDeclaration::property("z", TypeDescriptor::primitive("int")).first(),
            ],
        )
        .unwrap();

        let ids: Vec<_> = spec.properties().iter().map(|p| p.id().as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[test]
    fn test_with_ordering_reports_duplicates_first() {
        // "x" twice would also be a duplicate order name
        let result = InterfaceSpec::with_ordering(
            "a.Node",
            SpecKind::Impl,
            vec![],
            vec![
                PropertyDeclaration::property("x", TypeDescriptor::primitive("int")),
                PropertyDeclaration::child("x", TypeDescriptor::reference("Tree")).first(),
            ],
        );

        assert!(matches!(
            result,
            Err(NodegenError::Validation(ValidationError::DuplicateProperty { ref property, .. }))
                if property.as_str() == "x"
        ));
    }

    #[test]
    fn test_deserialize_defaults() {
        let spec: InterfaceSpec = serde_json::from_str(
            r#"{
                "id": "a.Node",
                "kind": "IMPL",
                "properties": [
                    {"id": "x", "type": {"name": "int", "shape": "primitive"}, "role": "PROPERTY"}
                ]
            }"#,
        )
        .unwrap();

        let x = spec.property("x").unwrap();
        assert!(x.participates_in_hash());
        assert!(x.participates_in_equivalence());
        assert!(!x.is_override());
        assert!(spec.parents().is_empty());
    }

    #[test]
    fn test_deserialize_rejects_duplicates() {
        let result: Result<InterfaceSpec, _> = serde_json::from_str(
            r#"{
                "id": "a.Node",
                "kind": "IMPL",
                "properties": [
                    {"id": "x", "type": {"name": "int", "shape": "primitive"}, "role": "PROPERTY"},
                    {"id": "x", "type": {"name": "int", "shape": "primitive"}, "role": "CHILD"}
                ]
            }"#,
        );
        assert!(result.is_err());
    }
}
