//! Core of the `jspack` bundler
//!
//! The binary is a thin layer over [`orchestrator::BundleOrchestrator`];
//! the library is exposed so integration tests and benches can drive
//! discovery and emission directly.

pub mod analysis;
pub mod bundle_emitter;
pub mod config;
pub mod dirs;
pub mod errors;
pub mod graph_builder;
pub mod module_builder;
pub mod orchestrator;
pub mod resolver;
pub mod runtime;
pub mod storage;
pub mod transform;
pub mod types;
pub mod util;
