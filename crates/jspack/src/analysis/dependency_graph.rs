//! Module-level dependency graph over a finished [`ModuleTable`]

use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::FxHashMap;

use crate::types::{ModuleId, ModuleTable};

/// Directed graph with one node per module.
///
/// Edges point from a dependency to its dependent, so if A imports B the
/// graph holds B -> A.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ModuleId, ()>,
    node_indices: FxHashMap<ModuleId, NodeIndex>,
}

impl DependencyGraph {
    pub fn from_table(table: &ModuleTable) -> Self {
        let mut this = Self::default();
        for record in table {
            this.add_module(&record.id);
        }
        for record in table {
            for dependency in record.deps.values() {
                this.add_dependency(&record.id, dependency);
            }
        }
        this
    }

    fn add_module(&mut self, id: &ModuleId) -> NodeIndex {
        if let Some(&index) = self.node_indices.get(id) {
            return index;
        }
        let index = self.graph.add_node(id.clone());
        self.node_indices.insert(id.clone(), index);
        index
    }

    /// Record that `from` imports `to`
    fn add_dependency(&mut self, from: &ModuleId, to: &ModuleId) {
        let from_index = self.add_module(from);
        let to_index = self.add_module(to);
        if !self.graph.contains_edge(to_index, from_index) {
            self.graph.add_edge(to_index, from_index, ());
        }
    }

    pub fn module_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Modules that import `id`
    pub fn dependents(&self, id: &ModuleId) -> Vec<&ModuleId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Modules that `id` imports
    pub fn dependencies(&self, id: &ModuleId) -> Vec<&ModuleId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &ModuleId, direction: Direction) -> Vec<&ModuleId> {
        let Some(&index) = self.node_indices.get(id) else {
            return vec![];
        };
        let mut neighbors: Vec<&ModuleId> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|n| &self.graph[n])
            .collect();
        neighbors.sort();
        neighbors
    }

    /// Strongly connected components, dependencies before dependents.
    ///
    /// Tarjan's algorithm yields components in reverse topological order of
    /// the edge direction, which here means dependents first.
    pub fn components(&self) -> Vec<Vec<ModuleId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .rev()
            .map(|component| {
                let mut ids: Vec<ModuleId> = component
                    .into_iter()
                    .map(|index| self.graph[index].clone())
                    .collect();
                ids.sort();
                ids
            })
            .collect()
    }

    /// Every module, each after the modules it imports. Members of one cycle
    /// are listed together in identity order.
    pub fn dependency_order(&self) -> Vec<ModuleId> {
        self.components().into_iter().flatten().collect()
    }

    /// Groups of modules that import each other, including self-imports
    pub fn cycles(&self) -> Vec<Vec<ModuleId>> {
        let mut cycles: Vec<Vec<ModuleId>> = self
            .components()
            .into_iter()
            .filter(|component| match component.as_slice() {
                [single] => self.node_indices.get(single).is_some_and(|&index| {
                    self.graph.contains_edge(index, index)
                }),
                _ => true,
            })
            .collect();
        cycles.sort();
        cycles
    }
}
