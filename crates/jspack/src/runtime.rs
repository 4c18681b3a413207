//! In-process loader
//!
//! Host-side twin of the JavaScript loader embedded in every bundle, for
//! modules compiled into native [`ModuleUnit`]s. It follows the same rules:
//! one exports object per identity, registered in the cache before the unit
//! runs, and `require` resolved through the calling module's dependency map.

use std::{cell::RefCell, fmt, rc::Rc};

use log::trace;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{DependencyMap, ModuleId, ModuleTable};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Cannot find module '{0}' in bundle")]
    UnknownModule(ModuleId),

    #[error("Cannot resolve '{specifier}' from module '{module}'")]
    UnknownSpecifier { module: ModuleId, specifier: String },

    #[error("module '{module}' threw: {message}")]
    Thrown { module: ModuleId, message: String },
}

/// Shared, mutable exports object of one module
#[derive(Clone, Default)]
pub struct Exports(Rc<RefCell<Map<String, Value>>>);

impl Exports {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(name.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Whether both handles refer to the same module instance
    pub fn same_instance(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.borrow().iter()).finish()
    }
}

/// Executable body of one module
pub trait ModuleUnit {
    fn invoke(&self, require: &mut Require<'_>, exports: &Exports) -> Result<(), RuntimeError>;
}

impl<F> ModuleUnit for F
where
    F: Fn(&mut Require<'_>, &Exports) -> Result<(), RuntimeError>,
{
    fn invoke(&self, require: &mut Require<'_>, exports: &Exports) -> Result<(), RuntimeError> {
        self(require, exports)
    }
}

/// The `require` handed to one executing module
pub struct Require<'r> {
    runtime: &'r Runtime,
    module: &'r ModuleId,
    deps: &'r DependencyMap,
}

impl Require<'_> {
    /// Resolve `specifier` through the current module's dependency map
    pub fn require(&mut self, specifier: &str) -> Result<Exports, RuntimeError> {
        let Some(target) = self.deps.get(specifier) else {
            return Err(RuntimeError::UnknownSpecifier {
                module: self.module.clone(),
                specifier: specifier.to_owned(),
            });
        };
        self.runtime.require(target)
    }

    /// Identity of the module this `require` belongs to
    pub fn module(&self) -> &ModuleId {
        self.module
    }
}

impl fmt::Debug for Require<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Require")
            .field("module", self.module)
            .field("deps", self.deps)
            .finish_non_exhaustive()
    }
}

struct RuntimeModule {
    deps: DependencyMap,
    unit: Box<dyn ModuleUnit>,
}

/// Module table plus cache; single-threaded like the bundle loader
#[derive(Default)]
pub struct Runtime {
    modules: FxHashMap<ModuleId, RuntimeModule>,
    cache: RefCell<FxHashMap<ModuleId, Exports>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("modules", &self.modules.len())
            .field("cached", &self.cache.borrow().len())
            .finish()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: ModuleId, deps: DependencyMap, unit: F)
    where
        F: Fn(&mut Require<'_>, &Exports) -> Result<(), RuntimeError> + 'static,
    {
        self.register_unit(id, deps, Box::new(unit));
    }

    pub fn register_unit(&mut self, id: ModuleId, deps: DependencyMap, unit: Box<dyn ModuleUnit>) {
        self.modules.insert(id, RuntimeModule { deps, unit });
    }

    /// Pair each record of `table` with its compiled unit.
    ///
    /// Records without a unit are skipped and fail with
    /// [`RuntimeError::UnknownModule`] when required.
    pub fn from_table(
        table: &ModuleTable,
        mut units: FxHashMap<ModuleId, Box<dyn ModuleUnit>>,
    ) -> Self {
        let mut runtime = Self::new();
        for record in table {
            if let Some(unit) = units.remove(&record.id) {
                runtime.modules.insert(
                    record.id.clone(),
                    RuntimeModule {
                        deps: record.deps.clone(),
                        unit,
                    },
                );
            }
        }
        runtime
    }

    /// Return the exports of `id`, executing the module on first use
    pub fn require(&self, id: &ModuleId) -> Result<Exports, RuntimeError> {
        if let Some(exports) = self.cache.borrow().get(id) {
            return Ok(exports.clone());
        }
        let Some(module) = self.modules.get(id) else {
            return Err(RuntimeError::UnknownModule(id.clone()));
        };

        let exports = Exports::default();
        self.cache.borrow_mut().insert(id.clone(), exports.clone());
        trace!("Executing {id}");

        let mut require = Require {
            runtime: self,
            module: id,
            deps: &module.deps,
        };
        module.unit.invoke(&mut require, &exports)?;
        Ok(exports)
    }

    /// Start execution at `entry`
    pub fn run(&self, entry: &ModuleId) -> Result<(), RuntimeError> {
        self.require(entry).map(|_| ())
    }

    pub fn is_loaded(&self, id: &ModuleId) -> bool {
        self.cache.borrow().contains_key(id)
    }
}
