//! Analyses over the discovered module table
//!
//! Nothing here changes the bundle; the results feed diagnostics.

pub mod circular_deps;
pub mod dependency_graph;

pub use circular_deps::{CircularDependencyAnalysis, ModuleCycle, analyze_cycles};
pub use dependency_graph::DependencyGraph;
