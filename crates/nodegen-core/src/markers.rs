//! Decoding of annotated accessor methods into property declarations
//!
//! The host annotation model is reduced to a [`MethodDescriptor`] whose
//! markers are plain strings such as `Child`, `Override` or
//! `Ordering.Before("operand")`. Each marker is parsed once into a
//! [`MemberMarker`] and folded into a [`PropertyDeclaration`].

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::diagnostics::{Category, Diagnostic, Diagnostics, Site};
use crate::error::ValidationError;
use crate::model::{
    InterfaceSpec, OrderingConstraints, PropertyDeclaration, PropertyId, PropertyRole, SpecId,
    SpecKind, TypeDescriptor,
};
use crate::naming::property_name_from_accessor;
use crate::order::{self, OrderError};

/// Explicit name value that asks for the name to be derived from the method
pub const INFER_NAME: &str = "__infer__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberMarker {
    Role(PropertyRole),
    Override,
    Optional,
    First,
    Last,
    Before(PropertyId),
    After(PropertyId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    #[error("unknown marker '{0}'")]
    Unknown(String),

    #[error("marker '{0}' needs a value")]
    MissingValue(String),
}

fn split_value(marker: &str) -> (&str, Option<&str>) {
    match marker.split_once('(') {
        Some((name, rest)) => {
            let value = rest.strip_suffix(')').unwrap_or(rest).trim();
            let value = value.trim_matches('"');
            (name.trim(), (!value.is_empty()).then_some(value))
        }
        None => (marker, None),
    }
}

impl FromStr for MemberMarker {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
        let (name, value) = split_value(trimmed);
        let name = name.strip_prefix("Ordering.").unwrap_or(name);

        let needs_value = |value: Option<&str>| {
            value
                .map(PropertyId::new)
                .ok_or_else(|| MarkerError::MissingValue(trimmed.to_string()))
        };

        match name {
            "Property" => Ok(MemberMarker::Role(PropertyRole::Property)),
            "Child" => Ok(MemberMarker::Role(PropertyRole::Child)),
            "Children" => Ok(MemberMarker::Role(PropertyRole::Children)),
            "Override" => Ok(MemberMarker::Override),
            "Optional" => Ok(MemberMarker::Optional),
            "First" => Ok(MemberMarker::First),
            "Last" => Ok(MemberMarker::Last),
            "Before" => needs_value(value).map(MemberMarker::Before),
            "After" => needs_value(value).map(MemberMarker::After),
            _ => Err(MarkerError::Unknown(trimmed.to_string())),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One accessor method as seen by the extraction layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(default)]
    pub parameter_count: usize,
    pub return_type: TypeDescriptor,
    #[serde(default)]
    pub markers: Vec<String>,
    /// Property name given on the role marker; `__infer__` or absent derives it
    #[serde(default)]
    pub property_name: Option<String>,
    #[serde(default = "default_true")]
    pub hash: bool,
    #[serde(default = "default_true")]
    pub equivalence: bool,
}

impl MethodDescriptor {
    pub fn getter(name: impl Into<String>, return_type: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            parameter_count: 0,
            return_type,
            markers: Vec::new(),
            property_name: None,
            hash: true,
            equivalence: true,
        }
    }

    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.property_name = Some(name.into());
        self
    }

    pub fn with_parameters(mut self, count: usize) -> Self {
        self.parameter_count = count;
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

    fn property_id(&self) -> PropertyId {
        match self.property_name.as_deref() {
            Some(name) if name != INFER_NAME && !name.is_empty() => PropertyId::new(name),
            _ => PropertyId::new(property_name_from_accessor(&self.name)),
        }
    }
}

/// Decode one method into a declaration
pub fn decode(method: &MethodDescriptor) -> Result<PropertyDeclaration, ValidationError> {
    if method.parameter_count > 0 {
        return Err(ValidationError::NotAGetter {
            method: method.name.clone(),
            parameters: method.parameter_count,
        });
    }

    let mut role: Option<PropertyRole> = None;
    let mut is_override = false;
    let mut optional = false;
    let mut ordering = OrderingConstraints::default();

    for raw in &method.markers {
        let marker = raw.parse::<MemberMarker>().map_err(|e| match e {
            MarkerError::Unknown(marker) => ValidationError::UnknownMarker {
                method: method.name.clone(),
                marker,
            },
            MarkerError::MissingValue(marker) => ValidationError::MissingMarkerValue {
                method: method.name.clone(),
                marker,
            },
        })?;

        match marker {
            MemberMarker::Role(found) => {
                if let Some(existing) = role {
                    return Err(ValidationError::DuplicateRole {
                        method: method.name.clone(),
                        existing: existing.to_string(),
                        found: found.to_string(),
                    });
                }
                role = Some(found);
            }
            MemberMarker::Override => is_override = true,
            MemberMarker::Optional => optional = true,
            MemberMarker::First => ordering.first = true,
            MemberMarker::Last => ordering.last = true,
            MemberMarker::Before(id) => {
                ordering.before.insert(id);
            }
            MemberMarker::After(id) => {
                ordering.after.insert(id);
            }
        }
    }

    let role = role.ok_or_else(|| ValidationError::MissingRole(method.name.clone()))?;

    Ok(
        PropertyDeclaration::new(method.property_id(), method.return_type.clone(), role)
            .with_override(is_override)
            .with_optional(optional)
            .with_hash(method.hash)
            .with_equivalence(method.equivalence)
            .with_ordering(ordering),
    )
}

/// A decoded spec plus whatever was skipped on the way
#[derive(Debug, Clone)]
pub struct Extraction {
    pub spec: InterfaceSpec,
    pub diagnostics: Diagnostics,
}

/// Assembles an [`InterfaceSpec`] from raw methods
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    id: SpecId,
    kind: SpecKind,
    parents: Vec<SpecId>,
    methods: Vec<MethodDescriptor>,
}

impl SpecBuilder {
    pub fn new(id: impl Into<SpecId>, kind: SpecKind) -> Self {
        Self {
            id: id.into(),
            kind,
            parents: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: impl Into<SpecId>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = MethodDescriptor>) -> Self {
        self.methods.extend(methods);
        self
    }

    /// Decode every method and order the result.
    ///
    /// Methods that fail to decode, and later duplicates of a property id,
    /// are skipped with a diagnostic. Unsatisfiable ordering keeps a
    /// best-effort order.
    pub fn build(self) -> Result<Extraction, ValidationError> {
        let mut diagnostics = Diagnostics::new();
        let mut seen = HashSet::new();
        let mut properties = Vec::with_capacity(self.methods.len());

        for method in &self.methods {
            match decode(method) {
                Ok(declaration) => {
                    if !seen.insert(declaration.id().clone()) {
                        let error = ValidationError::DuplicateProperty {
                            spec: self.id.clone(),
                            property: declaration.id().clone(),
                        };
                        diagnostics.record(Diagnostic::error(
                            Category::Validation,
                            Site::property(self.id.clone(), declaration.id().clone()),
                            format!("{} (from '{}')", error, method.name),
                        ));
                        continue;
                    }
                    properties.push(declaration);
                }
                Err(e) => diagnostics.record(Diagnostic::warning(
                    Category::Validation,
                    Site::spec(self.id.clone()),
                    format!("skipping '{}': {}", method.name, e),
                )),
            }
        }

        let (properties, error) = order::sort_lenient(properties);
        match error {
            Some(OrderError::Cycle(cycle)) => diagnostics.record(Diagnostic::error(
                Category::Cycle,
                Site::spec(self.id.clone()),
                format!("Property ordering failed: {}", cycle),
            )),
            Some(other) => diagnostics.record(Diagnostic::error(
                Category::Validation,
                Site::spec(self.id.clone()),
                other.to_string(),
            )),
            None => debug!("{}: {} properties decoded", self.id, properties.len()),
        }

        let spec = InterfaceSpec::new(self.id, self.kind, self.parents, properties)?;
        Ok(Extraction { spec, diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn getter(name: &str) -> MethodDescriptor {
        MethodDescriptor::getter(name, TypeDescriptor::reference("ExpressionTree"))
    }

    #[test]
    fn test_parse_markers() {
        assert_eq!(
            "@Child".parse::<MemberMarker>().unwrap(),
            MemberMarker::Role(PropertyRole::Child)
        );
        assert_eq!(
            "Ordering.Before(\"right\")".parse::<MemberMarker>().unwrap(),
            MemberMarker::Before(PropertyId::new("right"))
        );
        assert_eq!("After(left)".parse::<MemberMarker>().unwrap(), MemberMarker::After(PropertyId::new("left")));
        assert_eq!("Ordering.First".parse::<MemberMarker>().unwrap(), MemberMarker::First);
        assert_eq!(
            "Before()".parse::<MemberMarker>(),
            Err(MarkerError::MissingValue("Before()".to_string()))
        );
        assert_eq!(
            "Deprecated".parse::<MemberMarker>(),
            Err(MarkerError::Unknown("Deprecated".to_string()))
        );
    }

    #[test]
    fn test_decode_infers_name() {
        let declaration = decode(&getter("getLeftOperand").marker("Child").marker("Override")).unwrap();
        assert_eq!(declaration.id().as_str(), "leftOperand");
        assert_eq!(declaration.role(), PropertyRole::Child);
        assert!(declaration.is_override());

        let named = decode(&getter("getLeftOperand").marker("Child").named(INFER_NAME)).unwrap();
        assert_eq!(named.id().as_str(), "leftOperand");

        let explicit = decode(&getter("getLeftOperand").marker("Child").named("lhs")).unwrap();
        assert_eq!(explicit.id().as_str(), "lhs");
    }

    #[test]
    fn test_hash_and_equivalence_are_independent() {
        let declaration = decode(&getter("getX").marker("Property").with_hash(false)).unwrap();
        assert!(!declaration.participates_in_hash());
        assert!(declaration.participates_in_equivalence());
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            decode(&getter("getX").marker("Child").with_parameters(1)),
            Err(ValidationError::NotAGetter { parameters: 1, .. })
        ));
        assert!(matches!(
            decode(&getter("getX").marker("Child").marker("Children")),
            Err(ValidationError::DuplicateRole { .. })
        ));
        assert_eq!(
            decode(&getter("getX").marker("Override")),
            Err(ValidationError::MissingRole("getX".to_string()))
        );
        assert!(matches!(
            decode(&getter("getX").marker("Child").marker("Cached")),
            Err(ValidationError::UnknownMarker { .. })
        ));
    }

    #[test]
    fn test_builder_skips_and_orders() {
        let extraction = SpecBuilder::new("tree.Binary", SpecKind::Impl)
            .parent("tree.Expression")
            .method(getter("getRight").marker("Child"))
            .method(getter("getLeft").marker("Child").marker("Ordering.Before(right)"))
            .method(getter("getOperator").marker("Property").marker("First"))
            .method(getter("evaluate").with_parameters(2))
            .method(getter("getLeft").marker("Child"))
            .build()
            .unwrap();

        let ids: Vec<&str> = extraction
            .spec
            .properties()
            .iter()
            .map(|p| p.id().as_str())
            .collect();
        assert_eq!(ids, vec!["operator", "left", "right"]);
        assert_eq!(extraction.spec.parents(), &[SpecId::new("tree.Expression")]);
        assert_eq!(extraction.diagnostics.len(), 2);
    }

    #[test]
    fn test_builder_reports_ordering_cycle() {
        let extraction = SpecBuilder::new("tree.Loop", SpecKind::Impl)
            .method(getter("getA").marker("Property").marker("Before(b)"))
            .method(getter("getB").marker("Property").marker("Before(a)"))
            .build()
            .unwrap();

        assert_eq!(extraction.spec.properties().len(), 2);
        assert_eq!(extraction.diagnostics.by_category(Category::Cycle).count(), 1);
    }
}
