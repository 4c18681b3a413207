//! Module Builder
//!
//! Turns one module identity into a [`ModuleRecord`]: read the source, parse
//! it, resolve its imports against the module's directory and compile the
//! tree for the configured target. The builder holds no per-build state, so
//! one instance is shared by every discovery worker.

use std::{fmt, sync::Arc};

use log::debug;

use crate::{
    errors::BuildError,
    resolver::{module_dir, resolve},
    storage::Storage,
    transform::{Target, Transform},
    types::{DependencyMap, ModuleId, ModuleRecord},
    util::{sha256_hex, short_hash},
};

pub struct ModuleBuilder<T> {
    transform: T,
    storage: Arc<dyn Storage>,
    target: Target,
}

impl<T> fmt::Debug for ModuleBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBuilder")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<T: Transform> ModuleBuilder<T> {
    pub fn new(transform: T, storage: Arc<dyn Storage>, target: Target) -> Self {
        Self {
            transform,
            storage,
            target,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Build the record for `id`
    pub fn build(&self, id: &ModuleId) -> Result<ModuleRecord, BuildError> {
        let path = id.as_path();

        // A missing file surfaces here rather than in the resolver
        let source = self
            .storage
            .read_file(path)
            .map_err(|err| BuildError::Parse {
                path: path.to_path_buf(),
                message: format!("cannot read module: {err}"),
            })?;
        let content_hash = sha256_hex(source.as_bytes());

        let tree = self
            .transform
            .parse(&source)
            .map_err(|err| BuildError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;

        let importer_dir = module_dir(id);
        let mut deps = DependencyMap::default();
        for specifier in self.transform.extract_imports(&tree) {
            if deps.contains_key(&specifier) {
                continue;
            }
            let resolved =
                resolve(&importer_dir, &specifier).map_err(|err| BuildError::Parse {
                    path: path.to_path_buf(),
                    message: format!("cannot resolve '{specifier}': {err}"),
                })?;
            deps.insert(specifier, resolved);
        }

        let code = self
            .transform
            .generate_code(&tree, self.target)
            .map_err(|err| BuildError::Transform {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;

        debug!(
            "Built {id} ({} dependencies, sha256 {})",
            deps.len(),
            short_hash(&content_hash, 12)
        );

        Ok(ModuleRecord {
            id: id.clone(),
            code,
            deps,
            content_hash,
        })
    }
}
