//! Error taxonomy for discovery, emission and the outer bundling driver
//!
//! Every error is fatal to the bundling run. The binary wraps these in
//! `anyhow` for reporting; library callers can match on the variants.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::types::ModuleId;

/// A filesystem path that cannot serve as a module identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path is not valid UTF-8: {}", .0.display())]
pub struct NonUtf8PathError(pub PathBuf);

/// Failure to build a single module
#[derive(Debug, Error)]
pub enum BuildError {
    /// The file could not be read, did not tokenize/parse, or the build
    /// did not finish before its deadline
    #[error("parse error in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// The syntax tree could not be compiled for the requested target
    #[error("transform error in {}: {message}", .path.display())]
    Transform { path: PathBuf, message: String },
}

impl BuildError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Parse { path, .. } | Self::Transform { path, .. } => path,
        }
    }

    /// Short label used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "ParseError",
            Self::Transform { .. } => "TransformError",
        }
    }
}

/// A build failure annotated with where the failing module was imported from
#[derive(Debug, Error)]
#[error("{}", describe_discovery_failure(.module, .importer.as_ref(), .specifier.as_deref(), .source))]
pub struct DiscoveryError {
    /// The module whose build failed
    pub module: ModuleId,
    /// The module that first imported it (`None` for the entry)
    pub importer: Option<ModuleId>,
    /// The import string used by the importer
    pub specifier: Option<String>,
    #[source]
    pub source: BuildError,
}

fn describe_discovery_failure(
    module: &ModuleId,
    importer: Option<&ModuleId>,
    specifier: Option<&str>,
    source: &BuildError,
) -> String {
    match (importer, specifier) {
        (Some(importer), Some(specifier)) => format!(
            "{} while building {module} (imported as '{specifier}' from {importer})",
            source.kind()
        ),
        _ => format!("{} while building entry module {module}", source.kind()),
    }
}

/// Failure to produce the bundle artifact
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("entry module {0} is not part of the module table")]
    MissingEntry(ModuleId),

    #[error("module {module} maps '{specifier}' to {target}, which is not part of the module table")]
    DanglingDependency {
        module: ModuleId,
        specifier: String,
        target: ModuleId,
    },

    #[error("failed to serialize module table: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Top-level error of one bundling run
#[derive(Debug, Error)]
pub enum BundleError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
