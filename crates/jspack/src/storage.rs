//! File access seam
//!
//! The builder reads sources and the orchestrator writes the artifact only
//! through [`Storage`], so discovery can run against an in-memory file set.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::debug;
use rustc_hash::FxHashMap;

pub trait Storage: Send + Sync {
    /// Read a file as UTF-8 text
    fn read_file(&self, path: &Path) -> io::Result<String>;

    /// Write `contents` to `path`, replacing any existing file
    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// The real file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl Storage for FileSystem {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        debug!("Writing {} bytes to {}", contents.len(), path.display());
        fs::write(path, contents)
    }
}

/// In-memory file set; every write is recorded and can be read back
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<FxHashMap<PathBuf, String>>,
    writes: Mutex<Vec<PathBuf>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.add_file(path, contents);
        self
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.lock_files().insert(path.into(), contents.into());
    }

    /// Paths passed to `write_file`, in call order
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.lock_files().get(path).cloned()
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, FxHashMap<PathBuf, String>> {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.lock_files().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )
        })
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.lock_files()
            .insert(path.to_path_buf(), contents.to_owned());
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(path.to_path_buf());
        Ok(())
    }
}
