//! Spec registry and ancestor linearization over the parent DAG
//!
//! Specs may extend any number of parents. [`resolve_ancestors`] collects the
//! transitive parent set of one spec and orders it so that every ancestor
//! precedes the specs that extend it, which is the order member merging and
//! planning depend on.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, trace};

use crate::diagnostics::{Category, Diagnostic, Diagnostics, Site};
use crate::error::ValidationError;
use crate::model::{InterfaceSpec, SpecId, SpecKind};
use crate::order::{self, CycleError, OrderNode};

/// Resolves spec identities to specs
pub trait SpecLookup {
    fn lookup(&self, id: &SpecId) -> Option<Arc<InterfaceSpec>>;
}

impl SpecLookup for HashMap<SpecId, Arc<InterfaceSpec>> {
    fn lookup(&self, id: &SpecId) -> Option<Arc<InterfaceSpec>> {
        self.get(id).cloned()
    }
}

/// Host capability used when a parent identity is not in the input set.
///
/// Implementations typically inspect the host type system's direct
/// supertypes of `child` and decode the one named `missing` on the fly.
pub trait SupertypeFallback: Send + Sync {
    fn placeholder(&self, child: &InterfaceSpec, missing: &SpecId) -> Option<InterfaceSpec>;
}

/// Fallback that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl SupertypeFallback for NoFallback {
    fn placeholder(&self, _child: &InterfaceSpec, _missing: &SpecId) -> Option<InterfaceSpec> {
        None
    }
}

/// A parent identity nothing could resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingParent {
    pub id: SpecId,
    /// The spec that declared the parent
    pub referenced_by: SpecId,
}

/// Transitive ancestors of one spec
#[derive(Debug, Clone)]
pub struct ResolvedAncestry {
    spec: SpecId,
    ordered: Vec<Arc<InterfaceSpec>>,
    nearest_first: Vec<SpecId>,
    missing: Vec<MissingParent>,
    placeholders: Vec<SpecId>,
    cycle: Option<CycleError>,
}

impl ResolvedAncestry {
    pub fn spec(&self) -> &SpecId {
        &self.spec
    }

    /// Ancestors with every parent before the specs extending it
    pub fn ancestors(&self) -> &[Arc<InterfaceSpec>] {
        &self.ordered
    }

    pub fn ids(&self) -> Vec<&SpecId> {
        self.ordered.iter().map(|s| s.id()).collect()
    }

    /// Ancestors in discovery order: direct parents as declared, then theirs
    pub fn nearest_first(&self) -> &[SpecId] {
        &self.nearest_first
    }

    pub fn missing(&self) -> &[MissingParent] {
        &self.missing
    }

    /// Identities that were resolved through the host fallback
    pub fn placeholders(&self) -> &[SpecId] {
        &self.placeholders
    }

    pub fn cycle(&self) -> Option<&CycleError> {
        self.cycle.as_ref()
    }

    pub fn contains(&self, id: &SpecId) -> bool {
        self.nearest_first.contains(id)
    }

    /// Findings attributed to the resolved spec
    pub fn diagnostics(&self) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        for missing in &self.missing {
            diagnostics.push(Diagnostic::warning(
                Category::MissingAncestor,
                Site::spec(self.spec.clone()),
                format!(
                    "Missing type {} (parent of {})",
                    missing.id, missing.referenced_by
                ),
            ));
        }
        for placeholder in &self.placeholders {
            diagnostics.push(Diagnostic::note(
                Category::Placeholder,
                Site::spec(self.spec.clone()),
                format!("Using host-derived placeholder for {}", placeholder),
            ));
        }
        if let Some(cycle) = &self.cycle {
            diagnostics.push(Diagnostic::error(
                Category::Cycle,
                Site::spec(self.spec.clone()),
                format!("Inheritance cycle, using best-effort ancestor order: {}", cycle),
            ));
        }
        diagnostics
    }
}

struct AncestorWalk<'a> {
    root: &'a SpecId,
    lookup: &'a dyn SpecLookup,
    fallback: &'a dyn SupertypeFallback,
    visited: HashSet<SpecId>,
    queue: VecDeque<Arc<InterfaceSpec>>,
    discovered: Vec<Arc<InterfaceSpec>>,
    missing: Vec<MissingParent>,
    placeholders: Vec<SpecId>,
}

impl AncestorWalk<'_> {
    fn visit_parents(&mut self, child: &InterfaceSpec) {
        for parent in child.parents() {
            if parent == self.root || !self.visited.insert(parent.clone()) {
                continue;
            }

            let resolved = match self.lookup.lookup(parent) {
                Some(spec) => Some(spec),
                None => self.try_placeholder(child, parent),
            };

            match resolved {
                Some(spec) => {
                    trace!("ancestors of {}: found {}", self.root, spec.id());
                    self.discovered.push(spec.clone());
                    self.queue.push_back(spec);
                }
                None => self.missing.push(MissingParent {
                    id: parent.clone(),
                    referenced_by: child.id().clone(),
                }),
            }
        }
    }

    fn try_placeholder(
        &mut self,
        child: &InterfaceSpec,
        parent: &SpecId,
    ) -> Option<Arc<InterfaceSpec>> {
        let placeholder = self.fallback.placeholder(child, parent)?;
        if placeholder.id() != parent {
            debug!(
                "fallback for {} returned {}, ignoring",
                parent,
                placeholder.id()
            );
            return None;
        }
        self.placeholders.push(parent.clone());
        Some(Arc::new(placeholder))
    }
}

/// Collect and linearize every ancestor of `spec`.
///
/// Never fails: unresolvable parents are recorded as missing and a cycle
/// through the parent edges falls back to a best-effort order, flagged on
/// the result.
pub fn resolve_ancestors(
    spec: &InterfaceSpec,
    lookup: &dyn SpecLookup,
    fallback: &dyn SupertypeFallback,
) -> ResolvedAncestry {
    let mut walk = AncestorWalk {
        root: spec.id(),
        lookup,
        fallback,
        visited: HashSet::new(),
        queue: VecDeque::new(),
        discovered: Vec::new(),
        missing: Vec::new(),
        placeholders: Vec::new(),
    };

    walk.visit_parents(spec);
    while let Some(current) = walk.queue.pop_front() {
        walk.visit_parents(&current);
    }

    // The spec itself takes part in the sort so that a path back to it shows
    // up as a cycle; it is dropped from the result afterwards.
    let mut nodes: Vec<OrderNode<SpecId>> = walk
        .discovered
        .iter()
        .map(|s| OrderNode::new(s.id().clone()).with_after(s.parents().iter().cloned()))
        .collect();
    nodes.push(OrderNode::new(spec.id().clone()).with_after(spec.parents().iter().cloned()));

    let cycle_through_root = walk
        .discovered
        .iter()
        .any(|s| s.parents().contains(spec.id()));

    let (sorted, error) = order::sort_lenient(nodes);
    let cycle = match error {
        Some(e) => e.as_cycle().cloned(),
        None if cycle_through_root => Some(CycleError {
            stuck: vec![spec.id().to_string()],
            cycles: Vec::new(),
        }),
        None => None,
    };

    let by_id: HashMap<&SpecId, &Arc<InterfaceSpec>> =
        walk.discovered.iter().map(|s| (s.id(), s)).collect();
    let ordered: Vec<Arc<InterfaceSpec>> = sorted
        .iter()
        .filter_map(|node| by_id.get(&node.name).map(|s| Arc::clone(s)))
        .collect();

    debug!(
        "ancestors of {}: {:?}",
        spec.id(),
        ordered.iter().map(|s| s.id().as_str()).collect::<Vec<_>>()
    );

    ResolvedAncestry {
        spec: spec.id().clone(),
        nearest_first: walk.discovered.iter().map(|s| s.id().clone()).collect(),
        ordered,
        missing: walk.missing,
        placeholders: walk.placeholders,
        cycle,
    }
}

/// Registry of every spec in a run, keyed by identity in insertion order
#[derive(Debug, Clone, Default)]
pub struct SpecSet {
    specs: IndexMap<SpecId, Arc<InterfaceSpec>>,
}

impl SpecSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, reporting (and skipping) duplicate identities
    pub fn from_specs(specs: impl IntoIterator<Item = InterfaceSpec>) -> (Self, Diagnostics) {
        let mut set = Self::new();
        let mut diagnostics = Diagnostics::new();
        for spec in specs {
            let id = spec.id().clone();
            if let Err(e) = set.insert(spec) {
                diagnostics.record(Diagnostic::error(
                    Category::Validation,
                    Site::spec(id),
                    e.to_string(),
                ));
            }
        }
        (set, diagnostics)
    }

    pub fn insert(&mut self, spec: InterfaceSpec) -> Result<(), ValidationError> {
        if self.specs.contains_key(spec.id()) {
            return Err(ValidationError::DuplicateSpec(spec.id().clone()));
        }
        self.specs.insert(spec.id().clone(), Arc::new(spec));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<InterfaceSpec>> {
        self.specs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<InterfaceSpec>> {
        self.specs.values()
    }

    pub fn of_kind(&self, kind: SpecKind) -> impl Iterator<Item = &Arc<InterfaceSpec>> {
        self.specs.values().filter(move |s| s.kind() == kind)
    }

    /// Parent identities reachable from `Impl` specs that are not in the set,
    /// each with the specs that declare it
    pub fn unresolved_parents(&self) -> IndexMap<SpecId, Vec<SpecId>> {
        let mut stack: Vec<&SpecId> = self.of_kind(SpecKind::Impl).map(|s| s.id()).collect();
        let mut enqueued: HashSet<&SpecId> = stack.iter().copied().collect();
        let mut missing: IndexMap<SpecId, Vec<SpecId>> = IndexMap::new();

        while let Some(id) = stack.pop() {
            let Some(spec) = self.specs.get(id) else {
                continue;
            };
            for parent in spec.parents() {
                if !self.specs.contains_key(parent) {
                    missing
                        .entry(parent.clone())
                        .or_default()
                        .push(spec.id().clone());
                }
                if enqueued.insert(parent) {
                    stack.push(parent);
                }
            }
        }

        missing
    }

    /// Parent graph of the set; an edge `a -> b` means `a` extends `b`
    pub fn parent_graph(&self) -> DiGraph<SpecId, ()> {
        let mut graph = DiGraph::new();
        let indices: HashMap<&SpecId, NodeIndex> = self
            .specs
            .keys()
            .map(|id| (id, graph.add_node(id.clone())))
            .collect();

        for spec in self.specs.values() {
            for parent in spec.parents() {
                if let Some(&to) = indices.get(parent) {
                    graph.add_edge(indices[spec.id()], to, ());
                }
            }
        }
        graph
    }

    /// Groups of specs that (transitively) extend each other
    pub fn detect_parent_cycles(&self) -> Vec<Vec<SpecId>> {
        let graph = self.parent_graph();
        let mut cycles: Vec<Vec<SpecId>> = kosaraju_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut ids: Vec<SpecId> = scc.into_iter().map(|n| graph[n].clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }
}

impl SpecLookup for SpecSet {
    fn lookup(&self, id: &SpecId) -> Option<Arc<InterfaceSpec>> {
        self.specs.get(id).cloned()
    }
}
