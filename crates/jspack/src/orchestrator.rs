//! End-to-end bundling run
//!
//! Validates the configuration, discovers the module graph from the entry,
//! reports import cycles, emits the bundle and writes it through
//! [`Storage`]. Nothing is written unless every step before succeeded.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};

use crate::{
    analysis::{CircularDependencyAnalysis, ModuleCycle, analyze_cycles},
    bundle_emitter::{self, Bundle},
    config::Config,
    errors::BundleError,
    graph_builder::GraphBuilder,
    module_builder::ModuleBuilder,
    resolver,
    storage::Storage,
    transform::EsmTransform,
    types::{ModuleId, ModuleTable},
};

/// Everything produced by one run before anything is written
#[derive(Debug)]
pub struct BundleOutput {
    pub entry: ModuleId,
    pub table: ModuleTable,
    pub cycles: CircularDependencyAnalysis,
    pub bundle: Bundle,
}

/// Outcome of a run that wrote its artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSummary {
    pub entry: ModuleId,
    pub output_path: PathBuf,
    pub module_count: usize,
    pub hash: String,
    pub cycles: Vec<ModuleCycle>,
}

pub struct BundleOrchestrator {
    config: Config,
    storage: Arc<dyn Storage>,
    cwd: PathBuf,
}

impl fmt::Debug for BundleOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleOrchestrator")
            .field("config", &self.config)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl BundleOrchestrator {
    /// `cwd` is the base for relative entry and output paths
    pub fn new(config: Config, storage: Arc<dyn Storage>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            config,
            storage,
            cwd: cwd.into(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Absolute location of the artifact
    pub fn output_path(&self) -> PathBuf {
        resolver::absolutize(&self.config.output_path(), &self.cwd)
    }

    /// Discover, analyze and emit without writing anything
    pub fn build(&self) -> Result<BundleOutput, BundleError> {
        self.config.validate()?;
        let entry = self.entry()?;
        info!("Bundling {entry}");

        let builder = ModuleBuilder::new(
            EsmTransform::new(),
            Arc::clone(&self.storage),
            self.config.target,
        );
        let table = GraphBuilder::new(builder)
            .with_jobs(self.config.jobs)
            .with_timeout(self.config.timeout())
            .discover(&entry)?;
        info!("Discovered {} module(s)", table.len());

        let cycles = analyze_cycles(&table);
        report_cycles(&cycles);

        let bundle = bundle_emitter::emit(&entry, &table, self.config.loader)?;
        debug!("Bundle hash {}", bundle.hash);

        Ok(BundleOutput {
            entry,
            table,
            cycles,
            bundle,
        })
    }

    /// Run the whole pipeline and write the artifact
    pub fn bundle(&self) -> Result<BundleSummary, BundleError> {
        let output = self.build()?;
        let output_path = self.output_path();
        self.write(&output_path, &output.bundle)?;
        info!(
            "Wrote {} module(s) to {}",
            output.bundle.module_count,
            output_path.display()
        );

        Ok(BundleSummary {
            entry: output.entry,
            output_path,
            module_count: output.bundle.module_count,
            hash: output.bundle.hash,
            cycles: output.cycles.cycles,
        })
    }

    fn entry(&self) -> Result<ModuleId, BundleError> {
        let Some(entry) = self.config.entry.as_deref() else {
            return Err(BundleError::Config("no entry module configured".to_owned()));
        };
        ModuleId::from_path(&resolver::absolutize(entry, &self.cwd))
            .map_err(|err| BundleError::Config(format!("invalid entry: {err}")))
    }

    fn write(&self, path: &Path, bundle: &Bundle) -> Result<(), BundleError> {
        self.storage
            .write_file(path, &bundle.text)
            .map_err(|source| BundleError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

fn report_cycles(analysis: &CircularDependencyAnalysis) {
    for cycle in &analysis.cycles {
        if cycle.is_self_import() {
            warn!("Module imports itself: {cycle}");
        } else {
            warn!("Circular import: {cycle}");
        }
    }
}
