//! Closure expansion and deterministic ordering
//!
//! Seeds are expanded to a fixed point along outgoing edges of both kinds:
//! prerequisites are pulled in, and so is everything a member triggers.
//! Triggerers and dependents are never pulled in. The closed set is then
//! sorted so prerequisites come first and triggered operations come after
//! their cause, breaking ties by ascending name.

use crate::graph::OperationGraph;
use deltaplan_config::{Operation, OperationMap};
use deltaplan_core::{Error, Result};
use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

/// Ordered operations to execute, each with its declared metadata
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    steps: IndexMap<String, Operation>,
}

impl ExecutionPlan {
    /// A plan with nothing to do
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Position of `name` in the plan
    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.get_index_of(name)
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.steps.get(name)
    }

    /// Operation names in execution order
    pub fn names(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Operations in execution order
    pub fn operations(&self) -> impl DoubleEndedIterator<Item = &Operation> {
        self.steps.values()
    }

    /// Ordered selector list for an external orchestrator (e.g. a tag list)
    pub fn selectors(&self) -> Vec<String> {
        self.steps.keys().cloned().collect()
    }

    /// The same plan without `removed`, order preserved
    pub fn without(&self, removed: &BTreeSet<String>) -> Self {
        Self {
            steps: self
                .steps
                .iter()
                .filter(|(name, _)| !removed.contains(*name))
                .map(|(name, op)| (name.clone(), op.clone()))
                .collect(),
        }
    }
}

// Plans are equal only when their order is.
impl PartialEq for ExecutionPlan {
    fn eq(&self, other: &Self) -> bool {
        self.steps.iter().eq(other.steps.iter())
    }
}

impl Eq for ExecutionPlan {}

impl Serialize for ExecutionPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.steps.values())
    }
}

/// Resolves seed operations into an [`ExecutionPlan`]
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    map: &'a OperationMap,
    graph: &'a OperationGraph,
}

impl<'a> Resolver<'a> {
    /// `graph` must have been built from `map`
    pub fn new(map: &'a OperationMap, graph: &'a OperationGraph) -> Self {
        Self { map, graph }
    }

    /// Every operation reachable from `seeds` through prerequisite or trigger edges
    pub fn closure<I, S>(&self, seeds: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut closed = BTreeSet::new();
        let mut pending = Vec::new();

        for seed in seeds {
            let seed = seed.as_ref();
            if !self.graph.contains(seed) {
                return Err(Error::unknown_operation(seed));
            }
            if closed.insert(seed.to_string()) {
                pending.push(seed.to_string());
            }
        }

        while let Some(name) = pending.pop() {
            for next in self.graph.successors(&name) {
                if closed.insert(next.to_string()) {
                    pending.push(next.to_string());
                }
            }
        }

        Ok(closed)
    }

    /// Expand `seeds` and order the result
    pub fn resolve<I, S>(&self, seeds: I) -> Result<ExecutionPlan>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let closed = self.closure(seeds)?;
        if closed.is_empty() {
            return Ok(ExecutionPlan::empty());
        }

        let order = self.order(&closed)?;
        let mut steps = IndexMap::with_capacity(order.len());
        for name in order {
            let op = self.map.require(&name)?.clone();
            steps.insert(name, op);
        }

        tracing::debug!(operations = steps.len(), "plan resolved");
        Ok(ExecutionPlan { steps })
    }

    /// Kahn's algorithm restricted to `members`, smallest name first
    fn order(&self, members: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut later: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut waiting_on: BTreeMap<&str, usize> =
            members.iter().map(|name| (name.as_str(), 0)).collect();

        for name in members {
            let successors: Vec<&str> = self
                .graph
                .runs_before(name)
                .into_iter()
                .filter(|next| members.contains(*next))
                .collect();
            for next in &successors {
                if let Some(count) = waiting_on.get_mut(next) {
                    *count += 1;
                }
            }
            later.insert(name.as_str(), successors);
        }

        let mut ready: BinaryHeap<Reverse<&str>> = waiting_on
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| Reverse(*name))
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while let Some(Reverse(name)) = ready.pop() {
            order.push(name.to_string());
            for next in later.get(name).into_iter().flatten() {
                if let Some(count) = waiting_on.get_mut(next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(*next));
                    }
                }
            }
        }

        if order.len() != members.len() {
            // Graph construction rejects cycles, so this only happens when the
            // graph and map are out of step.
            let stuck: Vec<String> = waiting_on
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            return Err(Error::cycle(stuck));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltaplan_config::MapBuilder;

    fn map_of(ops: Vec<Operation>) -> OperationMap {
        let mut builder = MapBuilder::new();
        builder.add_source("test", ops).unwrap();
        builder.build()
    }

    fn resolve(map: &OperationMap, seeds: &[&str]) -> Vec<String> {
        let graph = OperationGraph::build(map).unwrap();
        Resolver::new(map, &graph)
            .resolve(seeds.iter().copied())
            .unwrap()
            .selectors()
    }

    #[test]
    fn test_prerequisites_come_first() {
        let map = map_of(vec![
            Operation::new("install_packages").with_provides(["packages"]),
            Operation::new("create_user").with_provides(["app_user"]),
            Operation::new("deploy_app").with_depends_on(["packages", "app_user"]),
        ]);
        assert_eq!(
            resolve(&map, &["deploy_app"]),
            vec!["create_user", "install_packages", "deploy_app"]
        );
    }

    #[test]
    fn test_prerequisites_are_transitive() {
        let map = map_of(vec![
            Operation::new("a").with_provides(["la"]),
            Operation::new("b").with_provides(["lb"]).with_depends_on(["la"]),
            Operation::new("c").with_depends_on(["lb"]),
        ]);
        assert_eq!(resolve(&map, &["c"]), vec!["a", "b", "c"]);
        assert_eq!(resolve(&map, &["a"]), vec!["a"]);
    }

    #[test]
    fn test_triggers_follow_their_cause() {
        let map = map_of(vec![
            Operation::new("a_reload").with_depends_on(["conf"]),
            Operation::new("z_render").with_provides(["conf"]).with_triggers(["a_reload"]),
        ]);
        // Name order alone would put a_reload first.
        assert_eq!(resolve(&map, &["z_render"]), vec!["z_render", "a_reload"]);
    }

    #[test]
    fn test_triggered_operations_pull_their_prerequisites() {
        let map = map_of(vec![
            Operation::new("render").with_triggers(["restart"]),
            Operation::new("certs").with_provides(["tls"]),
            Operation::new("restart").with_depends_on(["tls"]),
        ]);
        assert_eq!(resolve(&map, &["render"]), vec!["certs", "render", "restart"]);
    }

    #[test]
    fn test_triggerers_are_not_pulled_in() {
        let map = map_of(vec![
            Operation::new("render").with_triggers(["restart"]),
            Operation::new("restart"),
        ]);
        assert_eq!(resolve(&map, &["restart"]), vec!["restart"]);
    }

    #[test]
    fn test_empty_seed_yields_empty_plan() {
        let map = map_of(vec![Operation::new("a")]);
        let graph = OperationGraph::build(&map).unwrap();
        let plan = Resolver::new(&map, &graph).resolve(Vec::<String>::new()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unknown_seed_is_an_error() {
        let map = map_of(vec![Operation::new("a")]);
        let graph = OperationGraph::build(&map).unwrap();
        let err = Resolver::new(&map, &graph).resolve(["nope"]).unwrap_err();
        assert!(matches!(err, Error::UnknownOperation { .. }));
    }

    #[test]
    fn test_plan_carries_metadata_and_serializes_in_order() {
        let map = map_of(vec![
            Operation::new("b").with_requires_vars(["port"]),
            Operation::new("a").with_triggers(["b"]),
        ]);
        let graph = OperationGraph::build(&map).unwrap();
        let plan = Resolver::new(&map, &graph).resolve(["a"]).unwrap();

        assert_eq!(plan.position("b"), Some(1));
        assert!(plan.get("b").unwrap().requires_vars.contains("port"));

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json[0]["name"], "a");
        assert_eq!(json[1]["name"], "b");

        let trimmed = plan.without(&BTreeSet::from(["a".to_string()]));
        assert_eq!(trimmed.selectors(), vec!["b"]);
    }
}
