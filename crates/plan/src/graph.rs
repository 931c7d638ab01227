//! Operation graph built from an operation map
//!
//! Every operation is a node. Edges carry a [`RelationKind`]:
//!
//! - `Prerequisite` A → B: A depends on a label B provides, so B runs first.
//! - `Trigger` A → B: A triggers B, so B runs after A.
//!
//! Construction checks referential integrity and rejects any cyclic chain of
//! "runs before" constraints, reporting the whole cycle.

use deltaplan_config::{MapFingerprint, OperationMap};
use deltaplan_core::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Kind of relation between two operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Source depends on a label the target provides
    Prerequisite,
    /// Source schedules the target after it completes
    Trigger,
}

/// Directed graph of operations, immutable once built
#[derive(Debug, Clone)]
pub struct OperationGraph {
    graph: DiGraph<String, RelationKind>,
    nodes: BTreeMap<String, NodeIndex>,
    fingerprint: MapFingerprint,
}

impl OperationGraph {
    /// Build and validate the graph for `map`.
    ///
    /// Fails on the first dangling reference, then on the first cycle.
    pub fn build(map: &OperationMap) -> Result<Self> {
        let (built, mut problems) = Self::assemble(map);
        if !problems.is_empty() {
            return Err(problems.swap_remove(0));
        }
        if let Some(cycle) = built.find_cycles(true).into_iter().next() {
            return Err(Error::cycle(cycle));
        }

        tracing::debug!(
            nodes = built.graph.node_count(),
            edges = built.graph.edge_count(),
            fingerprint = %built.fingerprint.short(),
            "operation graph built"
        );
        Ok(built)
    }

    /// Every structural problem of `map` at once.
    ///
    /// Dangling references come first in map order, followed by each cycle
    /// one depth-first pass finds among the remaining edges. Empty when
    /// [`OperationGraph::build`] would succeed.
    pub fn diagnose(map: &OperationMap) -> Vec<Error> {
        let (graph, mut problems) = Self::assemble(map);
        problems.extend(graph.find_cycles(false).into_iter().map(Error::cycle));
        tracing::debug!(problems = problems.len(), "operation map diagnosed");
        problems
    }

    /// Add every resolvable edge, collecting dangling references instead
    fn assemble(map: &OperationMap) -> (Self, Vec<Error>) {
        let mut graph = DiGraph::with_capacity(map.len(), map.len());
        let mut nodes = BTreeMap::new();
        let mut problems = Vec::new();

        for name in map.names() {
            let idx = graph.add_node(name.to_string());
            nodes.insert(name.to_string(), idx);
        }

        let mut edges: BTreeSet<(NodeIndex, NodeIndex, RelationKind)> = BTreeSet::new();

        for op in map.operations() {
            let from = nodes[&op.name];

            for label in &op.depends_on {
                let Some(providers) = map.providers_of(label).filter(|p| !p.is_empty()) else {
                    problems.push(Error::dangling_dependency(&op.name, label));
                    continue;
                };

                // Providing the label yourself does not make you your own prerequisite.
                for provider in providers.iter().filter(|p| **p != op.name) {
                    edges.insert((from, nodes[provider], RelationKind::Prerequisite));
                }
            }

            for target in &op.triggers {
                match nodes.get(target) {
                    Some(&to) => {
                        edges.insert((from, to, RelationKind::Trigger));
                    }
                    None => problems.push(Error::dangling_trigger(&op.name, target)),
                }
            }
        }

        for (from, to, kind) in edges {
            graph.add_edge(from, to, kind);
        }

        let built = Self {
            graph,
            nodes,
            fingerprint: map.fingerprint().clone(),
        };
        (built, problems)
    }

    /// Fingerprint of the map this graph was built from
    pub fn fingerprint(&self) -> &MapFingerprint {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Operation names in ascending order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Direct prerequisites of `name`, in ascending order
    pub fn prerequisites(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing, Some(RelationKind::Prerequisite))
    }

    /// Operations `name` triggers directly, in ascending order
    pub fn triggered(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing, Some(RelationKind::Trigger))
    }

    /// Operations that depend on something `name` provides
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming, Some(RelationKind::Prerequisite))
    }

    /// Operations that trigger `name`
    pub fn triggerers(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming, Some(RelationKind::Trigger))
    }

    /// Everything expansion pulls in from `name`: prerequisites and triggered operations
    pub fn successors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing, None)
    }

    /// Operations that must run after `name`
    pub fn runs_before(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.nodes.get(name) else {
            return Vec::new();
        };

        let mut later: BTreeSet<&str> = BTreeSet::new();
        for edge in self.graph.edges_directed(idx, Direction::Incoming) {
            if *edge.weight() == RelationKind::Prerequisite {
                later.insert(self.graph[edge.source()].as_str());
            }
        }
        for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
            if *edge.weight() == RelationKind::Trigger {
                later.insert(self.graph[edge.target()].as_str());
            }
        }
        later.into_iter().collect()
    }

    /// Dependency-only view: `(dependent, prerequisite)` pairs
    pub fn dependency_edges(&self) -> Vec<(&str, &str)> {
        self.edges_of(Some(RelationKind::Prerequisite))
            .into_iter()
            .map(|(from, to, _)| (from, to))
            .collect()
    }

    /// Combined view of every edge, sorted
    pub fn edges(&self) -> Vec<(&str, &str, RelationKind)> {
        self.edges_of(None)
    }

    fn edges_of(&self, kind: Option<RelationKind>) -> Vec<(&str, &str, RelationKind)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .filter(|edge| kind.map_or(true, |k| *edge.weight() == k))
            .map(|edge| {
                (
                    self.graph[edge.source()].as_str(),
                    self.graph[edge.target()].as_str(),
                    *edge.weight(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    fn neighbors(&self, name: &str, direction: Direction, kind: Option<RelationKind>) -> Vec<&str> {
        let Some(&idx) = self.nodes.get(name) else {
            return Vec::new();
        };

        let found: BTreeSet<&str> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|edge| kind.map_or(true, |k| *edge.weight() == k))
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                self.graph[other].as_str()
            })
            .collect();
        found.into_iter().collect()
    }

    /// Depth-first search over "runs before" constraints with an explicit
    /// stack, so long chains cannot exhaust the call stack. A back edge yields
    /// the cycle from its first member around to itself.
    fn find_cycles(&self, first_only: bool) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut on_path: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<(&str, std::vec::IntoIter<&str>)> = Vec::new();

        for root in self.nodes.keys().map(String::as_str) {
            if !visited.insert(root) {
                continue;
            }
            on_path.insert(root);
            stack.push((root, self.runs_before(root).into_iter()));

            while let Some((_, later)) = stack.last_mut() {
                let Some(next) = later.next() else {
                    if let Some((done, _)) = stack.pop() {
                        on_path.remove(done);
                    }
                    continue;
                };

                if on_path.contains(next) {
                    let start = stack.iter().position(|(name, _)| *name == next).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|(name, _)| name.to_string()).collect();
                    cycle.push(next.to_string());
                    cycles.push(cycle);
                    if first_only {
                        return cycles;
                    }
                } else if visited.insert(next) {
                    on_path.insert(next);
                    stack.push((next, self.runs_before(next).into_iter()));
                }
            }
        }
        cycles
    }
}
