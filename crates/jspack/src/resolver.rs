//! Import specifier resolution
//!
//! Maps the import string written in a module onto the canonical identity of
//! the file it names. Resolution is purely lexical: no filesystem access, no
//! existence check and no extension probing. A specifier that names a missing
//! file still resolves; the failure surfaces later when that module is built.

use std::path::{Component, Path, PathBuf};

use log::trace;

use crate::{errors::NonUtf8PathError, types::ModuleId};

/// Resolve `specifier` against the directory of the importing module.
///
/// Follows `path.resolve(importer_dir, specifier)` semantics: an absolute
/// specifier replaces the base, anything else is joined onto it, and the
/// result is normalized. Fails only when the importer directory is not valid
/// UTF-8.
pub fn resolve(importer_dir: &Path, specifier: &str) -> Result<ModuleId, NonUtf8PathError> {
    let joined = importer_dir.join(specifier);
    let normalized = normalize_path(&joined);
    trace!(
        "Resolved '{specifier}' from {} to {}",
        importer_dir.display(),
        normalized.display()
    );
    ModuleId::from_path(&normalized)
}

/// Directory that relative imports inside `module` resolve against
pub fn module_dir(module: &ModuleId) -> PathBuf {
    module
        .as_path()
        .parent()
        .map_or_else(|| PathBuf::from(Component::RootDir.as_os_str()), Path::to_path_buf)
}

/// Turn a possibly relative path into an absolute, normalized one using `cwd`
/// as the base
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&cwd.join(path))
    }
}

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding segment. `..` above the root stays at the root; for relative
/// inputs leading `..` segments are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    normalized.pop();
                    depth -= 1;
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            Component::Normal(segment) => {
                normalized.push(segment);
                depth += 1;
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}
