use std::path::PathBuf;

use etcetera::BaseStrategy;

/// Name of the configuration file looked up in user and project directories
pub const CONFIG_FILE_NAME: &str = "jspack.toml";

/// Per-user configuration directory, e.g. `~/.config/jspack` on Linux
pub fn user_config_dir() -> Option<PathBuf> {
    etcetera::choose_base_strategy()
        .ok()
        .map(|strategy| strategy.config_dir().join("jspack"))
}

/// Path of the per-user configuration file, whether or not it exists
pub fn user_config_file() -> Option<PathBuf> {
    user_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}
