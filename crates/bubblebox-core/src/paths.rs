//! Path resolution utilities.

use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the scratch directory below `XDG_RUNTIME_DIR`.
pub const SCRATCH_DIR_NAME: &str = "bubblebox";

/// Get the bubblebox config directory (~/.config/bubblebox).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine config directory".to_string())
    })?;
    Ok(base.join("bubblebox"))
}

/// Get the main config file path (~/.config/bubblebox/bubblebox.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("bubblebox.json5"))
}

/// Get the scratch directory for a runtime dir.
pub fn scratch_dir(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join(SCRATCH_DIR_NAME)
}

/// Whether `name` can name a directory directly below the scratch dir.
pub fn is_valid_box_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && name != "." && name != ".."
}

/// Create a directory if needed; an existing directory is not an error.
pub fn ensure_dir(dir: &Path) -> Result<PathBuf, ConfigError> {
    fs::create_dir_all(dir)?;
    debug!("Ensured directory {}", dir.display());
    Ok(dir.to_path_buf())
}

/// Create the scratch directory below `runtime_dir`.
pub fn ensure_scratch_dir(runtime_dir: &Path) -> Result<PathBuf, ConfigError> {
    ensure_dir(&scratch_dir(runtime_dir))
}
