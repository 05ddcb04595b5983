//! Dependency graphs over phases and tasks.
//!
//! Both entity kinds name their prerequisites by id in `depends_on`. The
//! graph here checks that every reference resolves and that the whole set
//! is acyclic, and produces an execution order.

use std::collections::HashMap;

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{Error, Result};

use super::status::PhaseStatus;
use super::types::{Phase, Task};

/// Anything with an id and a list of prerequisite ids.
pub trait Dependent {
    fn dependency_id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

impl Dependent for Phase {
    fn dependency_id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

impl Dependent for Task {
    fn dependency_id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

/// Directed graph with an edge from each prerequisite to its dependent.
pub struct DependencyGraph<'a, T> {
    graph: DiGraph<&'a T, ()>,
    index: HashMap<&'a str, NodeIndex>,
}

impl<'a, T: Dependent> DependencyGraph<'a, T> {
    /// Build and validate a graph.
    ///
    /// Fails on duplicate ids, self-dependencies, references to unknown ids,
    /// and cycles.
    pub fn build(items: &'a [T]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::with_capacity(items.len());

        for item in items {
            let id = item.dependency_id();
            if index.contains_key(id) {
                return Err(Error::Validation(format!("duplicate id {}", id)));
            }
            index.insert(id, graph.add_node(item));
        }

        for item in items {
            let to = index[item.dependency_id()];
            for dep in item.dependencies() {
                if dep == item.dependency_id() {
                    return Err(Error::Validation(format!("{} depends on itself", dep)));
                }
                let from = index.get(dep.as_str()).ok_or_else(|| {
                    Error::Validation(format!(
                        "{} depends on unknown id {}",
                        item.dependency_id(),
                        dep
                    ))
                })?;
                graph.update_edge(*from, to, ());
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(Error::Validation("dependency cycle detected".to_string()));
        }

        Ok(Self { graph, index })
    }

    /// Items ordered so every prerequisite precedes its dependents.
    pub fn execution_order(&self) -> Result<Vec<&'a T>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let id = self.graph[cycle.node_id()].dependency_id();
            Error::Validation(format!("cycle detected at {}", id))
        })?;
        Ok(sorted.into_iter().map(|index| self.graph[index]).collect())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// Ids in `phase.depends_on` whose phase is not yet complete.
///
/// A reference to a phase that no longer exists counts as pending.
pub fn pending_dependencies(phase: &Phase, phases: &[Phase]) -> Vec<String> {
    phase
        .depends_on
        .iter()
        .filter(|dep| {
            !phases
                .iter()
                .any(|p| &p.id == *dep && p.status == PhaseStatus::Complete)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::Plan;

    fn phases(specs: &[(u32, &[u32])]) -> Vec<Phase> {
        let plan = Plan::new("demo", "add-auth", "Add auth");
        specs
            .iter()
            .map(|(seq, deps)| {
                let mut phase = Phase::new(&plan, *seq, &format!("Phase {}", seq), "");
                phase.depends_on = deps.iter().map(|d| Phase::id_for("add-auth", *d)).collect();
                phase
            })
            .collect()
    }

    fn position(order: &[&Phase], seq: u32) -> usize {
        order
            .iter()
            .position(|p| p.sequence == seq)
            .expect("phase present in order")
    }

    #[test]
    fn test_build_empty() {
        let items: Vec<Phase> = Vec::new();
        let graph = DependencyGraph::build(&items).unwrap();
        assert!(graph.is_empty());
        assert!(graph.execution_order().unwrap().is_empty());
    }

    #[test]
    fn test_diamond_order() {
        let items = phases(&[(1, &[]), (2, &[1]), (3, &[1]), (4, &[2, 3])]);
        let graph = DependencyGraph::build(&items).unwrap();
        let order = graph.execution_order().unwrap();

        assert_eq!(order.len(), 4);
        assert!(position(&order, 1) < position(&order, 2));
        assert!(position(&order, 1) < position(&order, 3));
        assert!(position(&order, 2) < position(&order, 4));
        assert!(position(&order, 3) < position(&order, 4));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let items = phases(&[(1, &[]), (2, &[9])]);
        let err = DependencyGraph::build(&items).err().unwrap();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("phase.add-auth.9")));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let items = phases(&[(1, &[1])]);
        assert!(matches!(
            DependencyGraph::build(&items),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let items = phases(&[(1, &[3]), (2, &[1]), (3, &[2])]);
        let err = DependencyGraph::build(&items).err().unwrap();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("cycle")));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut items = phases(&[(1, &[]), (2, &[])]);
        items[1].id = items[0].id.clone();
        assert!(DependencyGraph::build(&items).is_err());
    }

    #[test]
    fn test_pending_dependencies() {
        let mut items = phases(&[(1, &[]), (2, &[]), (3, &[1, 2])]);
        assert_eq!(pending_dependencies(&items[2], &items).len(), 2);

        items[0].status = PhaseStatus::Complete;
        assert_eq!(
            pending_dependencies(&items[2], &items),
            vec!["phase.add-auth.2".to_string()]
        );

        items[1].status = PhaseStatus::Complete;
        assert!(pending_dependencies(&items[2], &items).is_empty());
    }
}
