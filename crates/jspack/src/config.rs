//! Layered configuration
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. the user config file (`~/.config/jspack/jspack.toml` or the platform
//!    equivalent)
//! 3. the project `jspack.toml` in the working directory, or the file given
//!    with `--config`
//! 4. `JSPACK_*` environment variables
//! 5. command line flags (applied by the binary)
//!
//! Relative paths inside a config file are resolved against the directory
//! of that file; everything else is resolved against the working directory
//! by the orchestrator.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    bundle_emitter::LoaderStyle,
    dirs::{self, CONFIG_FILE_NAME},
    errors::BundleError,
    transform::Target,
};

pub const ENV_ENTRY: &str = "JSPACK_ENTRY";
pub const ENV_OUTPUT_DIRECTORY: &str = "JSPACK_OUTPUT_DIRECTORY";
pub const ENV_OUTPUT_FILENAME: &str = "JSPACK_OUTPUT_FILENAME";
pub const ENV_TARGET: &str = "JSPACK_TARGET";
pub const ENV_JOBS: &str = "JSPACK_JOBS";
pub const ENV_TIMEOUT_MS: &str = "JSPACK_TIMEOUT_MS";
pub const ENV_LOADER: &str = "JSPACK_LOADER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Entry module of the bundle
    pub entry: Option<PathBuf>,
    pub output_directory: PathBuf,
    pub output_filename: String,
    pub target: Target,
    /// Worker threads used during discovery
    pub jobs: usize,
    /// Deadline for building a single module
    pub timeout_ms: u64,
    pub loader: LoaderStyle,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry: None,
            output_directory: PathBuf::from("dist"),
            output_filename: "main.js".to_owned(),
            target: Target::default(),
            jobs: num_cpus::get().max(1),
            timeout_ms: 30_000,
            loader: LoaderStyle::default(),
        }
    }
}

/// Contents of one config file; absent keys leave the lower layer untouched
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    entry: Option<PathBuf>,
    output_directory: Option<PathBuf>,
    output_filename: Option<String>,
    target: Option<Target>,
    jobs: Option<usize>,
    timeout_ms: Option<u64>,
    loader: Option<LoaderStyle>,
}

impl Config {
    /// Load configuration from the user config, the project (or explicit)
    /// config file and the process environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
        let user_config = dirs::user_config_file();
        Self::load_from(user_config.as_deref(), &cwd, explicit, |key| {
            std::env::var(key).ok()
        })
    }

    /// Load with every source injected
    pub fn load_from(
        user_config: Option<&Path>,
        project_dir: &Path,
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = user_config.filter(|p| p.is_file()) {
            config.merge_file(path)?;
        }

        match explicit {
            Some(path) => config.merge_file(path)?,
            None => {
                let project = project_dir.join(CONFIG_FILE_NAME);
                if project.is_file() {
                    config.merge_file(&project)?;
                }
            }
        }

        config.apply_env(env)?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        debug!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        if let Some(entry) = file.entry {
            self.entry = Some(base.join(entry));
        }
        if let Some(dir) = file.output_directory {
            self.output_directory = base.join(dir);
        }
        if let Some(filename) = file.output_filename {
            self.output_filename = filename;
        }
        if let Some(target) = file.target {
            self.target = target;
        }
        if let Some(jobs) = file.jobs {
            self.jobs = jobs;
        }
        if let Some(timeout_ms) = file.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(loader) = file.loader {
            self.loader = loader;
        }
        Ok(())
    }

    /// Apply `JSPACK_*` overrides read through `env`
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        let env = |key: &str| env(key).filter(|value| !value.is_empty());

        if let Some(entry) = env(ENV_ENTRY) {
            self.entry = Some(PathBuf::from(entry));
        }
        if let Some(dir) = env(ENV_OUTPUT_DIRECTORY) {
            self.output_directory = PathBuf::from(dir);
        }
        if let Some(filename) = env(ENV_OUTPUT_FILENAME) {
            self.output_filename = filename;
        }
        if let Some(target) = env(ENV_TARGET) {
            self.target = parse_env(ENV_TARGET, &target)?;
        }
        if let Some(jobs) = env(ENV_JOBS) {
            self.jobs = parse_env(ENV_JOBS, &jobs)?;
        }
        if let Some(timeout) = env(ENV_TIMEOUT_MS) {
            self.timeout_ms = parse_env(ENV_TIMEOUT_MS, &timeout)?;
        }
        if let Some(loader) = env(ENV_LOADER) {
            self.loader = parse_env(ENV_LOADER, &loader)?;
        }
        Ok(())
    }

    /// Reject settings the bundler cannot run with
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.entry.is_none() {
            return Err(BundleError::Config(
                "no entry module configured (set `entry` or pass --entry)".to_owned(),
            ));
        }
        if self.output_filename.is_empty()
            || self.output_filename.contains(['/', '\\'])
            || matches!(self.output_filename.as_str(), "." | "..")
        {
            return Err(BundleError::Config(format!(
                "output filename '{}' must be a plain file name",
                self.output_filename
            )));
        }
        if self.jobs == 0 {
            return Err(BundleError::Config("jobs must be at least 1".to_owned()));
        }
        if self.timeout_ms == 0 {
            return Err(BundleError::Config(
                "timeout_ms must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_directory.join(&self.output_filename)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| anyhow!("Invalid value '{value}' for {key}: {err}"))
}
