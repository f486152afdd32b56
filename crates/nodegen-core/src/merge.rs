//! Cross-ancestor member merge with override resolution

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use crate::diagnostics::{Category, Diagnostic, Diagnostics, Severity, Site};
use crate::graph::ResolvedAncestry;
use crate::model::{InterfaceSpec, PropertyDeclaration, PropertyId, SpecId};

/// A member together with the spec that declared it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedMember {
    pub owner: SpecId,
    pub declaration: PropertyDeclaration,
}

impl MergedMember {
    pub fn id(&self) -> &PropertyId {
        self.declaration.id()
    }
}

/// Every member visible on a spec.
///
/// Iteration follows the position at which each id was first seen walking
/// from the most distant ancestor down to the spec; the stored value is the
/// most-derived declaration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedMemberSet {
    members: IndexMap<PropertyId, MergedMember>,
    #[serde(skip)]
    diagnostics: Diagnostics,
}

impl MergedMemberSet {
    pub fn get(&self, id: &str) -> Option<&MergedMember> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergedMember> {
        self.members.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &PropertyId> {
        self.members.keys()
    }

    /// Implicit-override findings recorded while merging
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn insert(&mut self, owner: &SpecId, declaration: &PropertyDeclaration, severity: Severity) {
        let incoming = MergedMember {
            owner: owner.clone(),
            declaration: declaration.clone(),
        };

        match self.members.get_mut(declaration.id()) {
            Some(existing) => {
                if !declaration.is_override() {
                    self.diagnostics.record(Diagnostic::new(
                        severity,
                        Category::OverrideAmbiguity,
                        Site::property(owner.clone(), declaration.id().clone()),
                        format!(
                            "{} redeclares '{}' from {} without an override marker",
                            owner,
                            declaration.id(),
                            existing.owner
                        ),
                    ));
                }
                trace!(
                    "merge: {} overrides {}::{}",
                    owner,
                    existing.owner,
                    declaration.id()
                );
                *existing = incoming;
            }
            None => {
                self.members.insert(declaration.id().clone(), incoming);
            }
        }
    }
}

impl<'a> IntoIterator for &'a MergedMemberSet {
    type Item = &'a MergedMember;
    type IntoIter = indexmap::map::Values<'a, PropertyId, MergedMember>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.values()
    }
}

/// Merge the members of `spec` with those of every ancestor.
///
/// Implicit overrides are reported as warnings; see [`merge_members_with`]
/// to raise them as errors instead.
pub fn merge_members(ancestry: &ResolvedAncestry, spec: &InterfaceSpec) -> MergedMemberSet {
    merge_members_with(ancestry, spec, Severity::Warning)
}

pub fn merge_members_with(
    ancestry: &ResolvedAncestry,
    spec: &InterfaceSpec,
    implicit_override: Severity,
) -> MergedMemberSet {
    let mut merged = MergedMemberSet::default();
    let sources = ancestry
        .ancestors()
        .iter()
        .map(Arc::as_ref)
        .chain(std::iter::once(spec));

    for source in sources {
        for declaration in source.properties() {
            merged.insert(source.id(), declaration, implicit_override);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{resolve_ancestors, NoFallback, SpecSet};
    use crate::model::{SpecKind, TypeDescriptor};
    use pretty_assertions::assert_eq;

    fn merged_for(specs: Vec<InterfaceSpec>, target: &str) -> MergedMemberSet {
        let (set, _) = SpecSet::from_specs(specs);
        let spec = set.get(target).unwrap().clone();
        let ancestry = resolve_ancestors(&spec, &set, &NoFallback);
        merge_members(&ancestry, &spec)
    }

    fn int(id: &str) -> PropertyDeclaration {
        PropertyDeclaration::property(id, TypeDescriptor::primitive("int"))
    }

    #[test]
    fn test_order_is_first_seen() {
        let merged = merged_for(
            vec![
                InterfaceSpec::new("Base", SpecKind::NoImpl, vec![], vec![int("a"), int("b")])
                    .unwrap(),
                InterfaceSpec::new(
                    "Leaf",
                    SpecKind::Impl,
                    vec!["Base".into()],
                    vec![int("c"), int("a").with_override(true)],
                )
                .unwrap(),
            ],
            "Leaf",
        );

        let ids: Vec<&str> = merged.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged.get("a").unwrap().owner, SpecId::new("Leaf"));
        assert_eq!(merged.get("b").unwrap().owner, SpecId::new("Base"));
        assert!(merged.diagnostics().is_empty());
    }

    #[test]
    fn test_override_is_transparent() {
        let merged = merged_for(
            vec![
                InterfaceSpec::new(
                    "Base",
                    SpecKind::NoImpl,
                    vec![],
                    vec![PropertyDeclaration::child("x", TypeDescriptor::reference("Tree"))],
                )
                .unwrap(),
                InterfaceSpec::new(
                    "Leaf",
                    SpecKind::Impl,
                    vec!["Base".into()],
                    vec![
                        PropertyDeclaration::child("x", TypeDescriptor::reference("Expr"))
                            .with_override(true),
                    ],
                )
                .unwrap(),
            ],
            "Leaf",
        );

        assert_eq!(merged.len(), 1);
        let x = merged.get("x").unwrap();
        assert_eq!(x.declaration.ty().name, "Expr");
        assert!(merged.diagnostics().is_empty());
    }

    #[test]
    fn test_implicit_override_reported() {
        let merged = merged_for(
            vec![
                InterfaceSpec::new("Base", SpecKind::NoImpl, vec![], vec![int("x")]).unwrap(),
                InterfaceSpec::new("Leaf", SpecKind::Impl, vec!["Base".into()], vec![int("x")])
                    .unwrap(),
            ],
            "Leaf",
        );

        assert_eq!(merged.get("x").unwrap().owner, SpecId::new("Leaf"));
        let findings: Vec<_> = merged
            .diagnostics()
            .by_category(Category::OverrideAmbiguity)
            .collect();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].site, Site::property("Leaf", "x"));
        assert!(findings[0].message.contains("Base"));
    }

    #[test]
    fn test_diamond_member_seen_once() {
        let merged = merged_for(
            vec![
                InterfaceSpec::new("Base", SpecKind::NoImpl, vec![], vec![int("x")]).unwrap(),
                InterfaceSpec::new("Left", SpecKind::NoImpl, vec!["Base".into()], vec![]).unwrap(),
                InterfaceSpec::new("Right", SpecKind::NoImpl, vec!["Base".into()], vec![int("y")])
                    .unwrap(),
                InterfaceSpec::new(
                    "Leaf",
                    SpecKind::Impl,
                    vec!["Left".into(), "Right".into()],
                    vec![],
                )
                .unwrap(),
            ],
            "Leaf",
        );

        let ids: Vec<&str> = merged.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert!(merged.diagnostics().is_empty());
    }

    #[test]
    fn test_strict_severity() {
        let (set, _) = SpecSet::from_specs(vec![
            InterfaceSpec::new("Base", SpecKind::NoImpl, vec![], vec![int("x")]).unwrap(),
            InterfaceSpec::new("Leaf", SpecKind::Impl, vec!["Base".into()], vec![int("x")])
                .unwrap(),
        ]);
        let spec = set.get("Leaf").unwrap().clone();
        let ancestry = resolve_ancestors(&spec, &set, &NoFallback);

        let merged = merge_members_with(&ancestry, &spec, Severity::Error);
        assert!(merged.diagnostics().has_errors());
    }
}
