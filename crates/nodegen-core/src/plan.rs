//! Single-inheritance implementation plans
//!
//! A plan fixes everything emission needs for one `IMPL` spec: the base it
//! extends, the fields it declares on top of that base, one accessor
//! directive per member it has to emit, its two constructors and the
//! hash/equivalence directives. Plans are built ancestor first so that a
//! spec can extend the nearest ancestor that already has one.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::NodegenConfig;
use crate::diagnostics::{Category, Diagnostic, Diagnostics, Site};
use crate::error::{NodegenError, ValidationError};
use crate::graph::ResolvedAncestry;
use crate::merge::{MergedMember, MergedMemberSet};
use crate::model::{
    CollectionOrdering, InterfaceSpec, PropertyDeclaration, PropertyId, PropertyRole, SpecId,
    TypeDescriptor,
};
use crate::naming::{implementation_name, NameAllocator};

/// What an implementation extends
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "spec", rename_all = "snake_case")]
pub enum ParentRef {
    /// The configured root base, which carries no fields
    Root,
    Plan(SpecId),
}

impl ParentRef {
    pub fn is_root(&self) -> bool {
        matches!(self, ParentRef::Root)
    }

    pub fn spec(&self) -> Option<&SpecId> {
        match self {
            ParentRef::Root => None,
            ParentRef::Plan(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPlan {
    pub name: PropertyId,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    pub role: PropertyRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessorCategory {
    Primitive,
    Object,
    Child,
    Children,
}

impl AccessorCategory {
    /// Category of a declaration; collection-typed plain properties are objects
    pub fn of(declaration: &PropertyDeclaration) -> Self {
        match declaration.role() {
            PropertyRole::Child => AccessorCategory::Child,
            PropertyRole::Children => AccessorCategory::Children,
            PropertyRole::Property if declaration.ty().is_primitive() => {
                AccessorCategory::Primitive
            }
            PropertyRole::Property => AccessorCategory::Object,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: AccessorCategory,
    pub hash: bool,
    pub equivalence: bool,
}

impl Classification {
    pub fn of(declaration: &PropertyDeclaration) -> Self {
        Self {
            category: AccessorCategory::of(declaration),
            hash: declaration.participates_in_hash(),
            equivalence: declaration.participates_in_equivalence(),
        }
    }

    /// Child or children accessors take part in tree traversal
    pub fn is_tree(&self) -> bool {
        matches!(
            self.category,
            AccessorCategory::Child | AccessorCategory::Children
        )
    }
}

/// Read-only wrapper a field-backed collection accessor returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionView {
    ImmutableList,
    ImmutableSet,
}

impl From<CollectionOrdering> for CollectionView {
    fn from(ordering: CollectionOrdering) -> Self {
        match ordering {
            CollectionOrdering::Ordered => CollectionView::ImmutableList,
            CollectionOrdering::Unordered => CollectionView::ImmutableSet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AccessorStrategy {
    /// Call the parent accessor and narrow its result to the declared type
    Narrowing {
        parent_type: TypeDescriptor,
        assert_non_null: bool,
    },
    /// Return the backing field
    Direct {
        field: PropertyId,
        #[serde(skip_serializing_if = "Option::is_none")]
        view: Option<CollectionView>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessorPlan {
    pub property: PropertyId,
    pub owner: SpecId,
    pub return_type: TypeDescriptor,
    pub classification: Classification,
    #[serde(flatten)]
    pub strategy: AccessorStrategy,
}

impl AccessorPlan {
    pub fn is_narrowing(&self) -> bool {
        matches!(self.strategy, AccessorStrategy::Narrowing { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "from", content = "property", rename_all = "snake_case")]
pub enum ParamSource {
    Extent,
    ExtentStart,
    ExtentEnd,
    Inherited(PropertyId),
    Declared(PropertyId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstructorParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub source: ParamSource,
    /// Emit a non-null check before the value is stored
    pub null_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldAssignment {
    pub field: PropertyId,
    pub param: String,
    pub null_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "body", rename_all = "snake_case")]
pub enum ConstructorBody {
    /// Pass the extent and inherited values to the base, then store the rest
    Forwarding {
        parent_args: Vec<String>,
        assignments: Vec<FieldAssignment>,
    },
    /// Build the extent from its two parts and call the forwarding constructor
    MergeExtent {
        extent_type: String,
        start: String,
        end: String,
        forwarded: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstructorPlan {
    pub params: Vec<ConstructorParam>,
    #[serde(flatten)]
    pub body: ConstructorBody,
}

impl ConstructorPlan {
    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Combine the base's hash with these accessors, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HashDirective {
    pub properties: Vec<PropertyId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    /// `==` on primitive values
    Value,
    /// Null-safe structural equality
    Structural,
    /// Recursive tree equivalence
    Tree,
    TreeOrdered,
    TreeUnordered,
}

impl ComparisonKind {
    pub fn of(declaration: &PropertyDeclaration) -> Self {
        match AccessorCategory::of(declaration) {
            AccessorCategory::Primitive => ComparisonKind::Value,
            AccessorCategory::Object => ComparisonKind::Structural,
            AccessorCategory::Child => ComparisonKind::Tree,
            AccessorCategory::Children => match declaration.ty().collection_ordering() {
                Some(CollectionOrdering::Unordered) => ComparisonKind::TreeUnordered,
                _ => ComparisonKind::TreeOrdered,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub property: PropertyId,
    pub kind: ComparisonKind,
}

/// The base's equivalence AND every comparison, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EquivalenceDirective {
    pub comparisons: Vec<Comparison>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImplementationPlan {
    target: SpecId,
    name: String,
    parent: ParentRef,
    base_name: String,
    all_fields: Vec<FieldPlan>,
    declared_fields: Vec<FieldPlan>,
    members: Vec<MergedMember>,
    accessors: Vec<AccessorPlan>,
    constructors: Vec<ConstructorPlan>,
    hash: HashDirective,
    equivalence: EquivalenceDirective,
    capabilities: Vec<SpecId>,
}

impl ImplementationPlan {
    pub fn target(&self) -> &SpecId {
        &self.target
    }

    /// Name of the generated implementation
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> &ParentRef {
        &self.parent
    }

    /// Name of what the implementation extends
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Every field, inherited ones first
    pub fn all_fields(&self) -> &[FieldPlan] {
        &self.all_fields
    }

    pub fn declared_fields(&self) -> &[FieldPlan] {
        &self.declared_fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldPlan> {
        self.all_fields.iter().find(|f| f.name.as_str() == name)
    }

    /// The merged members the plan was built from
    pub fn members(&self) -> &[MergedMember] {
        &self.members
    }

    pub fn member(&self, id: &str) -> Option<&MergedMember> {
        self.members.iter().find(|m| m.id().as_str() == id)
    }

    /// Accessors this implementation emits; inherited ones are not listed
    pub fn accessors(&self) -> &[AccessorPlan] {
        &self.accessors
    }

    pub fn accessor(&self, id: &str) -> Option<&AccessorPlan> {
        self.accessors.iter().find(|a| a.property.as_str() == id)
    }

    pub fn constructors(&self) -> &[ConstructorPlan] {
        &self.constructors
    }

    pub fn forwarding_constructor(&self) -> Option<&ConstructorPlan> {
        self.constructors
            .iter()
            .find(|c| matches!(c.body, ConstructorBody::Forwarding { .. }))
    }

    pub fn merge_constructor(&self) -> Option<&ConstructorPlan> {
        self.constructors
            .iter()
            .find(|c| matches!(c.body, ConstructorBody::MergeExtent { .. }))
    }

    pub fn hash(&self) -> &HashDirective {
        &self.hash
    }

    pub fn equivalence(&self) -> &EquivalenceDirective {
        &self.equivalence
    }

    /// The target and every ancestor it satisfies
    pub fn capabilities(&self) -> &[SpecId] {
        &self.capabilities
    }

    pub fn implements(&self, id: &str) -> bool {
        self.capabilities.iter().any(|c| c.as_str() == id)
    }
}

/// Append-only store of finished plans
#[derive(Debug, Clone, Default)]
pub struct PlanRegistry {
    plans: IndexMap<SpecId, Arc<ImplementationPlan>>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, plan: ImplementationPlan) -> Result<Arc<ImplementationPlan>, NodegenError> {
        if self.plans.contains_key(plan.target()) {
            return Err(NodegenError::Registry(format!(
                "plan for '{}' already registered",
                plan.target()
            )));
        }
        let plan = Arc::new(plan);
        self.plans.insert(plan.target().clone(), Arc::clone(&plan));
        Ok(plan)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ImplementationPlan>> {
        self.plans.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plans.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Plans in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ImplementationPlan>> {
        self.plans.values()
    }
}

/// A finished plan and the findings recorded while building it
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: ImplementationPlan,
    pub diagnostics: Diagnostics,
}

/// Plan the implementation of `spec`.
///
/// `ancestry` and `merged` must belong to `spec`, and `registry` must hold
/// the plans of every ancestor that could be planned. Problems with single
/// members are reported in the outcome's diagnostics and skip only that
/// member. The spec's kind is not checked; callers decide what gets planned.
pub fn build_plan(
    spec: &InterfaceSpec,
    ancestry: &ResolvedAncestry,
    merged: &MergedMemberSet,
    registry: &PlanRegistry,
    config: &NodegenConfig,
) -> Result<PlanOutcome, NodegenError> {
    if ancestry.spec() != spec.id() {
        return Err(NodegenError::Internal(format!(
            "ancestry of '{}' passed to plan '{}'",
            ancestry.spec(),
            spec.id()
        )));
    }

    let mut diagnostics = Diagnostics::new();
    let parent_plan = ancestry
        .nearest_first()
        .iter()
        .find_map(|id| registry.get(id.as_str()));

    let (parent, base_name) = match parent_plan {
        Some(plan) => (ParentRef::Plan(plan.target().clone()), plan.name().to_string()),
        None => (ParentRef::Root, config.root_base.clone()),
    };
    debug!("plan {}: extends {}", spec.id(), base_name);

    let inherited: &[FieldPlan] = parent_plan.map(|p| p.all_fields()).unwrap_or(&[]);
    let mut all_fields = inherited.to_vec();
    for member in merged {
        if !all_fields.iter().any(|f| &f.name == member.id()) {
            all_fields.push(FieldPlan {
                name: member.id().clone(),
                ty: member.declaration.ty().clone(),
                role: member.declaration.role(),
            });
        }
    }
    let declared_fields = all_fields[inherited.len()..].to_vec();

    let mut accessors = Vec::new();
    for member in merged {
        let parent_member = parent_plan.and_then(|p| p.member(member.id().as_str()));
        match plan_accessor(spec, member, parent_member, parent_plan, &mut diagnostics) {
            Some(accessor) => accessors.push(accessor),
            None => trace!("plan {}: no accessor for '{}'", spec.id(), member.id()),
        }
    }

    let hash = HashDirective {
        properties: accessors
            .iter()
            .filter(|a| a.classification.hash)
            .map(|a| a.property.clone())
            .collect(),
    };
    let equivalence = EquivalenceDirective {
        comparisons: merged
            .iter()
            .filter(|m| {
                accessors
                    .iter()
                    .any(|a| &a.property == m.id() && a.classification.equivalence)
            })
            .map(|m| Comparison {
                property: m.id().clone(),
                kind: ComparisonKind::of(&m.declaration),
            })
            .collect(),
    };

    let forwarding = forwarding_constructor(inherited, &declared_fields, config);
    let merging = merge_constructor(&forwarding, config);
    let constructors = vec![forwarding, merging];

    let mut capabilities = vec![spec.id().clone()];
    capabilities.extend(ancestry.ids().into_iter().cloned());

    let plan = ImplementationPlan {
        target: spec.id().clone(),
        name: implementation_name(spec.id(), &config.impl_suffix),
        parent,
        base_name,
        all_fields,
        declared_fields,
        members: merged.iter().cloned().collect(),
        accessors,
        constructors,
        hash,
        equivalence,
        capabilities,
    };

    Ok(PlanOutcome { plan, diagnostics })
}

fn plan_accessor(
    spec: &InterfaceSpec,
    member: &MergedMember,
    parent_member: Option<&MergedMember>,
    parent_plan: Option<&Arc<ImplementationPlan>>,
    diagnostics: &mut Diagnostics,
) -> Option<AccessorPlan> {
    let declaration = &member.declaration;
    let classification = Classification::of(declaration);

    let strategy = match (parent_member, parent_plan) {
        (Some(inherited), _) if inherited == member => return None,
        (Some(inherited), Some(parent_plan)) => {
            // What the parent's accessor returns, which may already be narrowed
            let parent_type = parent_plan
                .accessor(member.id().as_str())
                .map_or_else(|| inherited.declaration.ty().clone(), |a| a.return_type.clone());

            if !declaration.ty().can_narrow(&parent_type) {
                let error = ValidationError::IncompatibleOverride {
                    property: member.id().clone(),
                    parent: parent_type.to_string(),
                    child: declaration.ty().to_string(),
                };
                diagnostics.record(Diagnostic::error(
                    Category::Validation,
                    Site::property(spec.id().clone(), member.id().clone()),
                    error.to_string(),
                ));
                return None;
            }

            if !declaration.is_override() && inherited.owner != member.owner {
                diagnostics.record(Diagnostic::warning(
                    Category::FieldCollision,
                    Site::property(spec.id().clone(), member.id().clone()),
                    format!(
                        "field '{}' of {} is redeclared by {} without an override marker, keeping {}",
                        member.id(),
                        inherited.owner,
                        member.owner,
                        member.owner
                    ),
                ));
            }

            AccessorStrategy::Narrowing {
                parent_type,
                assert_non_null: declaration.ty().requires_null_check(),
            }
        }
        _ => AccessorStrategy::Direct {
            field: member.id().clone(),
            view: declaration.ty().collection_ordering().map(CollectionView::from),
        },
    };

    Some(AccessorPlan {
        property: member.id().clone(),
        owner: member.owner.clone(),
        return_type: declaration.ty().clone(),
        classification,
        strategy,
    })
}

fn forwarding_constructor(
    inherited: &[FieldPlan],
    declared: &[FieldPlan],
    config: &NodegenConfig,
) -> ConstructorPlan {
    let mut names = NameAllocator::new();
    let mut params = vec![ConstructorParam {
        name: names.allocate(&config.extent.name),
        ty: config.extent.ty.clone(),
        source: ParamSource::Extent,
        null_check: false,
    }];

    for field in inherited {
        params.push(ConstructorParam {
            name: names.allocate(field.name.as_str()),
            ty: field.ty.name.clone(),
            source: ParamSource::Inherited(field.name.clone()),
            null_check: false,
        });
    }

    let mut assignments = Vec::with_capacity(declared.len());
    for field in declared {
        let param = ConstructorParam {
            name: names.allocate(field.name.as_str()),
            ty: field.ty.name.clone(),
            source: ParamSource::Declared(field.name.clone()),
            null_check: field.ty.requires_null_check(),
        };
        assignments.push(FieldAssignment {
            field: field.name.clone(),
            param: param.name.clone(),
            null_check: param.null_check,
        });
        params.push(param);
    }

    let parent_args = params[..=inherited.len()]
        .iter()
        .map(|p| p.name.clone())
        .collect();

    ConstructorPlan {
        params,
        body: ConstructorBody::Forwarding {
            parent_args,
            assignments,
        },
    }
}

fn merge_constructor(forwarding: &ConstructorPlan, config: &NodegenConfig) -> ConstructorPlan {
    let mut names = NameAllocator::new();
    let start = names.allocate(&config.extent_parts.start);
    let end = names.allocate(&config.extent_parts.end);

    let mut params = vec![
        ConstructorParam {
            name: start.clone(),
            ty: config.extent_parts.ty.clone(),
            source: ParamSource::ExtentStart,
            null_check: false,
        },
        ConstructorParam {
            name: end.clone(),
            ty: config.extent_parts.ty.clone(),
            source: ParamSource::ExtentEnd,
            null_check: false,
        },
    ];

    // Values are checked once, by the forwarding constructor
    let mut forwarded = Vec::with_capacity(forwarding.params.len());
    for param in forwarding.params.iter().filter(|p| p.source != ParamSource::Extent) {
        let base = match &param.source {
            ParamSource::Inherited(id) | ParamSource::Declared(id) => id.as_str(),
            _ => param.name.as_str(),
        };
        let name = names.allocate(base);
        forwarded.push(name.clone());
        params.push(ConstructorParam {
            name,
            ty: param.ty.clone(),
            source: param.source.clone(),
            null_check: false,
        });
    }

    ConstructorPlan {
        params,
        body: ConstructorBody::MergeExtent {
            extent_type: config.extent.ty.clone(),
            start,
            end,
            forwarded,
        },
    }
}
