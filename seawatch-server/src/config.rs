//! Configuration file loading and command line overrides.
//!
//! Lookup order: `--config <path>` if given (must exist), otherwise
//! `<config dir>/seawatch/config.json` if present, otherwise built-in
//! defaults. Command line options are applied last.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use seawatch_core::WatchConfig;

use crate::{Cli, WatchError};

const CONFIG_FILE: &str = "config.json";

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "seawatch", "seawatch")
}

/// Where the config file lives when `--config` is not given.
pub fn default_config_path() -> Option<PathBuf> {
    get_project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Read and parse one config file.
pub fn read_config(path: &Path) -> Result<WatchConfig, WatchError> {
    let text = fs::read_to_string(path).map_err(|source| WatchError::ConfigRead {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| WatchError::ConfigParse {
        path: path.to_owned(),
        message: e.to_string(),
    })
}

/// Resolve the configuration for `args` and validate it.
pub fn load_config(args: &Cli) -> Result<WatchConfig, WatchError> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            read_config(path)?
        }
        None => match default_config_path() {
            Some(path) if path.exists() => {
                log::info!("Loading configuration from {}", path.display());
                read_config(&path)?
            }
            _ => {
                log::debug!("No configuration file, using defaults");
                WatchConfig::default()
            }
        },
    };
    apply_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

/// Command line options win over the file.
pub fn apply_overrides(config: &mut WatchConfig, args: &Cli) {
    if let Some(host) = &args.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = args.port {
        config.connection.port = port;
    }
    if let Some(depth) = args.min_depth {
        config.alarms.min_safe_depth_m = depth;
    }
    if let Some(cpa) = args.cpa_threshold {
        config.alarms.cpa_threshold_nm = cpa;
    }
    if let Some(tcpa) = args.tcpa_threshold {
        config.alarms.tcpa_threshold_min = tcpa;
    }
    if args.no_alarms {
        config.alarms.enabled = false;
    }
}
