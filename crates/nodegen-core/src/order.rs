//! Constrained topological ordering
//!
//! Elements carry optional `first`/`last` anchors plus `before`/`after` sets
//! naming their siblings. The solver is a Kahn's-algorithm variant: an edge
//! `a -> b` means `a` must precede `b`, anchors contribute edges to or from
//! every other element, and when several elements are ready at once the one
//! that came first in the input wins. Constraints naming elements that are
//! not part of the input are ignored.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::{debug, trace};

/// Anything that can be placed by the solver
pub trait Orderable {
    type Name: Clone + Eq + Hash + fmt::Display;

    fn order_name(&self) -> Self::Name;

    fn is_first(&self) -> bool {
        false
    }

    fn is_last(&self) -> bool {
        false
    }

    /// Names this element must precede
    fn before(&self) -> Vec<Self::Name> {
        Vec::new()
    }

    /// Names this element must follow
    fn after(&self) -> Vec<Self::Name> {
        Vec::new()
    }
}

/// Plain constraint record for callers that order things by name only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNode<N> {
    pub name: N,
    pub first: bool,
    pub last: bool,
    pub before: Vec<N>,
    pub after: Vec<N>,
}

impl<N> OrderNode<N> {
    pub fn new(name: N) -> Self {
        Self {
            name,
            first: false,
            last: false,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn with_after(mut self, after: impl IntoIterator<Item = N>) -> Self {
        self.after.extend(after);
        self
    }

    pub fn with_before(mut self, before: impl IntoIterator<Item = N>) -> Self {
        self.before.extend(before);
        self
    }
}

impl<N: Clone + Eq + Hash + fmt::Display> Orderable for OrderNode<N> {
    type Name = N;

    fn order_name(&self) -> N {
        self.name.clone()
    }

    fn is_first(&self) -> bool {
        self.first
    }

    fn is_last(&self) -> bool {
        self.last
    }

    fn before(&self) -> Vec<N> {
        self.before.clone()
    }

    fn after(&self) -> Vec<N> {
        self.after.clone()
    }
}

/// The solver ran out of ready elements before placing everything
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Ordering cycle (stuck: {})", .stuck.join(", "))]
pub struct CycleError {
    /// Every element left unplaced, in input order
    pub stuck: Vec<String>,
    /// Strongly connected components of the stuck set with more than one member
    pub cycles: Vec<Vec<String>>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("More than one element marked first: {}", .0.join(", "))]
    DuplicateFirst(Vec<String>),

    #[error("More than one element marked last: {}", .0.join(", "))]
    DuplicateLast(Vec<String>),

    #[error("Duplicate order name '{0}'")]
    DuplicateName(String),
}

impl OrderError {
    pub fn as_cycle(&self) -> Option<&CycleError> {
        match self {
            OrderError::Cycle(cycle) => Some(cycle),
            _ => None,
        }
    }
}

/// Precedence graph over input indices
struct ConstraintGraph {
    names: Vec<String>,
    successors: Vec<BTreeSet<usize>>,
    in_degree: Vec<usize>,
}

impl ConstraintGraph {
    fn build<T: Orderable>(elements: &[T]) -> Result<Self, OrderError> {
        let mut index: HashMap<T::Name, usize> = HashMap::with_capacity(elements.len());
        for (i, element) in elements.iter().enumerate() {
            let name = element.order_name();
            if index.insert(name.clone(), i).is_some() {
                return Err(OrderError::DuplicateName(name.to_string()));
            }
        }

        let firsts: Vec<usize> = (0..elements.len())
            .filter(|&i| elements[i].is_first())
            .collect();
        let lasts: Vec<usize> = (0..elements.len())
            .filter(|&i| elements[i].is_last())
            .collect();
        let names: Vec<String> = elements.iter().map(|e| e.order_name().to_string()).collect();

        if firsts.len() > 1 {
            return Err(OrderError::DuplicateFirst(
                firsts.iter().map(|&i| names[i].clone()).collect(),
            ));
        }
        if lasts.len() > 1 {
            return Err(OrderError::DuplicateLast(
                lasts.iter().map(|&i| names[i].clone()).collect(),
            ));
        }

        let mut graph = Self {
            names,
            successors: vec![BTreeSet::new(); elements.len()],
            in_degree: vec![0; elements.len()],
        };

        for (i, element) in elements.iter().enumerate() {
            for name in element.before() {
                if let Some(&j) = index.get(&name) {
                    graph.add_edge(i, j);
                }
            }
            for name in element.after() {
                if let Some(&j) = index.get(&name) {
                    graph.add_edge(j, i);
                }
            }
        }

        if let Some(&first) = firsts.first() {
            for other in 0..elements.len() {
                graph.add_edge(first, other);
            }
        }
        if let Some(&last) = lasts.first() {
            for other in 0..elements.len() {
                graph.add_edge(other, last);
            }
        }

        Ok(graph)
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        // Self-references carry no ordering information
        if from != to && self.successors[from].insert(to) {
            self.in_degree[to] += 1;
        }
    }

    /// Kahn's algorithm; returns the placed indices, which is a prefix of
    /// the full order when the graph has a cycle
    fn kahn(&self) -> Vec<usize> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: BTreeSet<usize> = (0..in_degree.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(next) = ready.pop_first() {
            trace!("order: placing '{}' ({} ready)", self.names[next], ready.len());
            order.push(next);
            for &succ in &self.successors[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }

        order
    }

    fn cycle_error(&self, placed: &[usize]) -> CycleError {
        let placed: BTreeSet<usize> = placed.iter().copied().collect();
        let stuck: Vec<usize> = (0..self.names.len())
            .filter(|i| !placed.contains(i))
            .collect();

        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: HashMap<usize, NodeIndex> =
            stuck.iter().map(|&i| (i, graph.add_node(i))).collect();
        for &i in &stuck {
            for succ in &self.successors[i] {
                if let Some(&to) = nodes.get(succ) {
                    graph.add_edge(nodes[&i], to, ());
                }
            }
        }

        let mut components: Vec<Vec<usize>> = kosaraju_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<usize> = scc.into_iter().map(|n| graph[n]).collect();
                members.sort_unstable();
                members
            })
            .collect();
        components.sort();

        let error = CycleError {
            stuck: stuck.iter().map(|&i| self.names[i].clone()).collect(),
            cycles: components
                .into_iter()
                .map(|scc| scc.into_iter().map(|i| self.names[i].clone()).collect())
                .collect(),
        };
        debug!("order: {}", error);
        error
    }
}

fn permute<T>(elements: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = elements.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

/// Sort `elements` so that every anchor and before/after constraint holds.
///
/// Ties between simultaneously ready elements are broken by input position,
/// so the result is deterministic for a given input.
pub fn sort<T: Orderable>(elements: Vec<T>) -> Result<Vec<T>, OrderError> {
    let graph = ConstraintGraph::build(&elements)?;
    let order = graph.kahn();
    if order.len() < elements.len() {
        return Err(graph.cycle_error(&order).into());
    }
    Ok(permute(elements, &order))
}

/// Best-effort variant of [`sort`] for callers that must keep going.
///
/// On a cycle the placeable prefix comes first, followed by the stuck
/// elements in input order. On a validation error the input order is kept.
pub fn sort_lenient<T: Orderable>(elements: Vec<T>) -> (Vec<T>, Option<OrderError>) {
    let graph = match ConstraintGraph::build(&elements) {
        Ok(graph) => graph,
        Err(e) => return (elements, Some(e)),
    };

    let mut order = graph.kahn();
    if order.len() == elements.len() {
        return (permute(elements, &order), None);
    }

    let error = graph.cycle_error(&order);
    let placed: BTreeSet<usize> = order.iter().copied().collect();
    order.extend((0..elements.len()).filter(|i| !placed.contains(i)));
    (permute(elements, &order), Some(error.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(name: &str) -> OrderNode<String> {
        OrderNode::new(name.to_string())
    }

    fn names(sorted: &[OrderNode<String>]) -> Vec<&str> {
        sorted.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_stable_without_constraints() {
        let sorted = sort(vec![node("c"), node("a"), node("b")]).unwrap();
        assert_eq!(names(&sorted), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_before_and_after() {
        let a = node("a").with_after(["c".to_string()]);
        let b = node("b").with_before(["a".to_string()]);
        let c = node("c");

        let sorted = sort(vec![a, b, c]).unwrap();
        assert_eq!(names(&sorted), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_first_and_last_anchors() {
        let mut last = node("last");
        last.last = true;
        let mut first = node("first");
        first.first = true;

        let sorted = sort(vec![last, node("x"), first, node("y")]).unwrap();
        assert_eq!(names(&sorted), vec!["first", "x", "y", "last"]);
    }

    #[test]
    fn test_unknown_names_ignored() {
        let a = node("a").with_after(["ghost".to_string()]);
        let sorted = sort(vec![a, node("b")]).unwrap();
        assert_eq!(names(&sorted), vec!["a", "b"]);
    }

    #[test]
    fn test_two_cycle_names_exactly_both() {
        let a = node("A").with_before(["B".to_string()]);
        let b = node("B").with_before(["A".to_string()]);

        let err = sort(vec![a, b]).unwrap_err();
        let cycle = err.as_cycle().expect("expected a cycle error");
        assert_eq!(cycle.stuck, vec!["A", "B"]);
        assert_eq!(cycle.cycles, vec![vec!["A".to_string(), "B".to_string()]]);
    }

    #[test]
    fn test_cycle_reports_downstream_separately() {
        let a = node("A").with_before(["B".to_string()]);
        let b = node("B").with_before(["A".to_string()]);
        let c = node("C").with_after(["A".to_string()]);

        let err = sort(vec![a, b, c, node("D")]).unwrap_err();
        let cycle = err.as_cycle().unwrap();
        assert_eq!(cycle.stuck, vec!["A", "B", "C"]);
        assert_eq!(cycle.cycles.len(), 1);
        assert_eq!(cycle.cycles[0], vec!["A", "B"]);
    }

    #[test]
    fn test_duplicate_first_is_an_error() {
        let mut a = node("a");
        a.first = true;
        let mut b = node("b");
        b.first = true;

        assert_eq!(
            sort(vec![a, b]).unwrap_err(),
            OrderError::DuplicateFirst(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_duplicate_last_is_an_error() {
        let mut a = node("a");
        a.last = true;
        let mut b = node("b");
        b.last = true;

        assert!(matches!(
            sort(vec![a, b, node("c")]),
            Err(OrderError::DuplicateLast(_))
        ));
    }

    #[test]
    fn test_duplicate_name_is_an_error() {
        assert_eq!(
            sort(vec![node("a"), node("a")]).unwrap_err(),
            OrderError::DuplicateName("a".to_string())
        );
    }

    #[test]
    fn test_lenient_appends_stuck_elements() {
        let a = node("A").with_before(["B".to_string()]);
        let b = node("B").with_before(["A".to_string()]);

        let (sorted, err) = sort_lenient(vec![a, node("x"), b]);
        assert_eq!(names(&sorted), vec!["x", "A", "B"]);
        assert!(err.and_then(|e| e.as_cycle().cloned()).is_some());
    }

    /// A random permutation plus precedence pairs taken from it, which is
    /// acyclic by construction.
    fn acyclic_nodes() -> impl Strategy<Value = (Vec<usize>, Vec<OrderNode<String>>)> {
        (1usize..10)
            .prop_flat_map(|n| {
                (
                    Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
                    prop::collection::vec((0..n, 0..n, any::<bool>()), 0..24),
                    any::<bool>(),
                    any::<bool>(),
                )
            })
            .prop_map(|(perm, pairs, anchor_first, anchor_last)| {
                let n = perm.len();
                let mut nodes: Vec<OrderNode<String>> =
                    (0..n).map(|i| OrderNode::new(format!("n{}", i))).collect();
                for (x, y, as_before) in pairs {
                    if x == y {
                        continue;
                    }
                    let (lo, hi) = (x.min(y), x.max(y));
                    let (earlier, later) = (perm[lo], perm[hi]);
                    if as_before {
                        let name = nodes[later].name.clone();
                        nodes[earlier].before.push(name);
                    } else {
                        let name = nodes[earlier].name.clone();
                        nodes[later].after.push(name);
                    }
                }
                if anchor_first {
                    nodes[perm[0]].first = true;
                }
                if anchor_last && n > 1 {
                    nodes[perm[n - 1]].last = true;
                }
                (perm, nodes)
            })
    }

    proptest! {
        #[test]
        fn prop_sort_satisfies_constraints((_perm, nodes) in acyclic_nodes()) {
            let sorted = sort(nodes.clone()).expect("acyclic input must sort");
            prop_assert_eq!(sorted.len(), nodes.len());

            let position: HashMap<&str, usize> = sorted
                .iter()
                .enumerate()
                .map(|(i, n)| (n.name.as_str(), i))
                .collect();

            for node in &nodes {
                let at = position[node.name.as_str()];
                for other in &node.before {
                    prop_assert!(at < position[other.as_str()]);
                }
                for other in &node.after {
                    prop_assert!(at > position[other.as_str()]);
                }
                if node.first {
                    prop_assert_eq!(at, 0);
                }
                if node.last {
                    prop_assert_eq!(at, nodes.len() - 1);
                }
            }
        }

        #[test]
        fn prop_sort_is_idempotent((_perm, nodes) in acyclic_nodes()) {
            let sorted = sort(nodes).expect("acyclic input must sort");
            let expected: Vec<String> = sorted.iter().map(|n| n.name.clone()).collect();

            // Chain each element after its predecessor and feed them back reversed
            let mut derived: Vec<OrderNode<String>> = expected
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let node = OrderNode::new(name.clone());
                    if i == 0 { node } else { node.with_after([expected[i - 1].clone()]) }
                })
                .collect();
            derived.reverse();

            let resorted: Vec<String> = sort(derived).unwrap().into_iter().map(|n| n.name).collect();
            prop_assert_eq!(resorted, expected);
        }
    }
}
