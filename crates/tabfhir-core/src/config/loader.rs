//! Configuration file discovery and loading

use super::tabfhir_config::TabfhirConfig;
use crate::error::TabfhirError;
use crate::result::Result;
use std::path::{Path, PathBuf};

/// Config file names in discovery priority order
pub const CONFIG_FILE_NAMES: &[&str] = &[".tabfhirrc.json", ".tabfhirrc.toml", "tabfhir.toml"];

/// Configuration loader for discovering and loading config files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Auto-discover a config file by walking up from `start_path`
    pub fn auto_discover(start_path: &Path) -> Result<Option<PathBuf>> {
        let mut current = start_path
            .canonicalize()
            .map_err(|e| TabfhirError::config_error(format!("Invalid path: {e}")))?;
        if current.is_file()
            && let Some(parent) = current.parent()
        {
            current = parent.to_path_buf();
        }

        loop {
            for filename in CONFIG_FILE_NAMES {
                let config_path = current.join(filename);
                if config_path.is_file() {
                    tracing::debug!("Found config: {}", config_path.display());
                    return Ok(Some(config_path));
                }
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<TabfhirConfig> {
        TabfhirConfig::load(path).map_err(|e| {
            TabfhirError::config_error(format!(
                "Failed to load config from '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Load config from an explicit path, or auto-discover it
    ///
    /// Falls back to the built-in defaults when discovery finds nothing.
    pub fn load(custom_path: Option<&Path>, start_dir: Option<&Path>) -> Result<TabfhirConfig> {
        if let Some(path) = custom_path {
            if !path.exists() {
                return Err(TabfhirError::config_error(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from_file(path);
        }

        let search_dir = start_dir.unwrap_or_else(|| Path::new("."));
        match Self::auto_discover(search_dir)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::debug!("No config file found; using defaults");
                Ok(TabfhirConfig::default())
            }
        }
    }
}
