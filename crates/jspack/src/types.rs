//! Shared type definitions for the jspack crate
//!
//! Module identity, the per-module build record, and the deduplicated module
//! table that flows from graph discovery into the bundle emitter.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Serialize, Serializer};

use crate::errors::NonUtf8PathError;

/// Type alias for FxHasher-based IndexMap
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Canonical identity of one source file within a build.
///
/// The identity is the normalized absolute path of the file. Two import
/// statements that point at the same file produce byte-identical identities,
/// which is what makes deduplication in the graph builder work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    /// Build an identity from an already normalized absolute path.
    ///
    /// Paths that are not valid UTF-8 are rejected instead of being converted
    /// lossily, which could give two different files the same identity.
    pub fn from_path(path: &Path) -> Result<Self, NonUtf8PathError> {
        path.to_str()
            .map(|path| Self(Arc::from(path)))
            .ok_or_else(|| NonUtf8PathError(path.to_path_buf()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&*self.0)
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.as_path().to_path_buf()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ModuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Relative import string as written in the importing file -> resolved identity.
///
/// Keys keep per-statement fidelity: `./a` and `./a.js` stay two entries even
/// when they resolve to the same module.
pub type DependencyMap = FxIndexMap<String, ModuleId>;

/// Built artifact for one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: ModuleId,
    /// Transformed executable text produced by the transform service
    pub code: String,
    /// Import map scoped to this module's own import statements
    pub deps: DependencyMap,
    /// SHA-256 of the raw source (hex-encoded)
    pub content_hash: String,
}

/// The complete, deduplicated set of module records for one bundle
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    records: FxIndexMap<ModuleId, ModuleRecord>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Returns `false` and keeps the existing record when the
    /// identity is already present.
    pub fn insert(&mut self, record: ModuleRecord) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.records.insert(record.id.clone(), record);
        true
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion (build completion) order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.records.keys()
    }

    /// Sort records by identity so serialization does not depend on build order
    pub fn sort(&mut self) {
        self.records.sort_keys();
    }

    /// Dependency targets that have no record of their own.
    ///
    /// Empty for every table produced by a successful discovery.
    pub fn missing_dependencies(&self) -> Vec<(&ModuleId, &str, &ModuleId)> {
        self.records
            .values()
            .flat_map(|record| {
                record
                    .deps
                    .iter()
                    .filter(|(_, target)| !self.records.contains_key(*target))
                    .map(move |(specifier, target)| (&record.id, specifier.as_str(), target))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ModuleTable {
    type Item = &'a ModuleRecord;
    type IntoIter = indexmap::map::Values<'a, ModuleId, ModuleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}
