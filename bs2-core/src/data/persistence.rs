//! JSON persistence for the configuration document
//!
//! Loads and saves [`AppConfig`] at the user config path. Saves are atomic:
//! write to a temp file, fsync, then rename over the target.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use bs2_error::{Bs2Error, Result};

use crate::constants::{limits, paths};
use crate::data::AppConfig;

/// Load the configuration from the default location.
///
/// A missing file yields the default configuration; the caller is expected to
/// normalize the result before use.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&paths::config_file_path())
}

/// Load the configuration from an explicit path
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }

    let metadata = fs::metadata(path)?;
    if metadata.len() > limits::MAX_CONFIG_SIZE {
        return Err(Bs2Error::config(format!(
            "config file {:?} exceeds {} bytes",
            path,
            limits::MAX_CONFIG_SIZE
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| Bs2Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: AppConfig = serde_json::from_str(&contents)?;
    info!("Loaded configuration from {:?}", path);
    Ok(config)
}

/// Save the configuration to the default location
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(&paths::config_file_path(), config)
}

/// Save the configuration to an explicit path, atomically
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&temp_path).map_err(|e| Bs2Error::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;
    file.write_all(json.as_bytes()).map_err(|e| Bs2Error::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;
    file.sync_all().map_err(|e| Bs2Error::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| {
        warn!("Atomic rename failed for {:?}: {}", path, e);
        Bs2Error::FileWrite {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    debug!("Saved configuration to {:?}", path);
    Ok(())
}
