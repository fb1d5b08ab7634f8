//! Configuration loading and merging logic.
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.axmirror/config.toml`
//! 3. **Project config** - `./.axmirror/config.toml`

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::config::types::{AdapterConfig, MirrorConfig, WorkerConfig};
use crate::config::validate_config;
use crate::errors::ConfigError;

const CONFIG_DIR: &str = ".axmirror";
const CONFIG_FILE: &str = "config.toml";

/// Load configuration from the hierarchy of config files.
///
/// # Errors
///
/// Returns an error if a file exists but cannot be read or parsed, or if
/// validation fails. Missing config files are not errors.
pub fn load_hierarchy() -> Result<MirrorConfig, ConfigError> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    let project_dir = std::env::current_dir()?;
    load_from_dirs(&home_dir, &project_dir)
}

/// Load and merge the user config under `home_dir` and the project config
/// under `project_dir`.
pub fn load_from_dirs(home_dir: &Path, project_dir: &Path) -> Result<MirrorConfig, ConfigError> {
    let mut config = MirrorConfig::default();

    for dir in [home_dir, project_dir] {
        let path = dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if let Some(found) = load_config_file(&path)? {
            config = merge_configs(config, found);
        }
    }

    validate_config(&config)?;
    Ok(config)
}

/// Load a configuration file. A missing file is `Ok(None)`.
pub fn load_config_file(path: &Path) -> Result<Option<MirrorConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(event = "core.config.file_not_found", path = %path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let config = toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    debug!(event = "core.config.file_loaded", path = %path.display());
    Ok(Some(config))
}

/// Merge two configurations, with `override_config` taking precedence for
/// every field it sets.
pub fn merge_configs(base: MirrorConfig, override_config: MirrorConfig) -> MirrorConfig {
    MirrorConfig {
        adapter: AdapterConfig {
            messaging_timeout_ms: override_config
                .adapter
                .messaging_timeout_ms
                .or(base.adapter.messaging_timeout_ms),
        },
        workers: WorkerConfig {
            max_blocking: override_config
                .workers
                .max_blocking
                .or(base.workers.max_blocking),
        },
    }
}
