//! Circular dependency report
//!
//! Cycles are legal: the loader hands a partially initialized exports object
//! to a module that re-enters an import cycle. The report only exists so the
//! user learns about them.

use std::fmt;

use serde::Serialize;

use super::DependencyGraph;
use crate::types::{ModuleId, ModuleTable};

/// Modules that import each other, in identity order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCycle {
    pub modules: Vec<ModuleId>,
}

impl ModuleCycle {
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn is_self_import(&self) -> bool {
        self.modules.len() == 1
    }
}

impl fmt::Display for ModuleCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for module in &self.modules {
            write!(f, "{module} -> ")?;
        }
        match self.modules.first() {
            Some(first) => write!(f, "{first}"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CircularDependencyAnalysis {
    pub cycles: Vec<ModuleCycle>,
    /// Size of the largest cycle
    pub largest_cycle_size: usize,
}

impl CircularDependencyAnalysis {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Whether `id` takes part in some cycle
    pub fn involves(&self, id: &ModuleId) -> bool {
        self.cycles.iter().any(|cycle| cycle.modules.contains(id))
    }
}

pub fn analyze_cycles(table: &ModuleTable) -> CircularDependencyAnalysis {
    let graph = DependencyGraph::from_table(table);
    let cycles: Vec<ModuleCycle> = graph
        .cycles()
        .into_iter()
        .map(|modules| ModuleCycle { modules })
        .collect();
    let largest_cycle_size = cycles.iter().map(ModuleCycle::len).max().unwrap_or(0);
    CircularDependencyAnalysis {
        cycles,
        largest_cycle_size,
    }
}
