// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Config file resolution, loading, and first-run persistence.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use scanwerk_core::ScanConfig;
use scanwerk_core::config::{expand_tilde, home_dir};
use scanwerk_core::error::{Result, ScanwerkError};
use tracing::{info, warn};

const APP_DIR: &str = "scanwerk";
const CONFIG_FILE: &str = "config.json";

/// Path of the config file.
///
/// An explicit path (from `--config` or `CONFIG_FILE`) wins; otherwise
/// `$XDG_CONFIG_HOME/scanwerk/config.json`, then
/// `~/.config/scanwerk/config.json`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    resolve_config_path(explicit, std::env::var_os("XDG_CONFIG_HOME"), home_dir())
}

fn resolve_config_path(explicit: Option<&Path>, xdg: Option<OsString>, home: PathBuf) -> PathBuf {
    if let Some(path) = explicit {
        return expand_tilde(path);
    }
    let base = match xdg {
        Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => home.join(".config"),
    };
    base.join(APP_DIR).join(CONFIG_FILE)
}

/// Load the config and prepare the scan directory.
pub fn load_or_init(path: &Path) -> ScanConfig {
    let mut config = load_or_default(path);
    config.scan_dir = expand_tilde(&config.scan_dir);
    if let Err(err) = std::fs::create_dir_all(&config.scan_dir) {
        warn!(scan_dir = %config.scan_dir.display(), %err, "could not create scan directory");
    }
    config
}

/// Load the config, writing defaults on first run.
///
/// Never fails: an unreadable or invalid file is logged and replaced by
/// defaults in memory. The file itself is left alone.
pub fn load_or_default(path: &Path) -> ScanConfig {
    match load_config(path) {
        Ok(Some(config)) => {
            info!(path = %path.display(), "config loaded");
            config
        }
        Ok(None) => {
            let config = ScanConfig::default();
            match persist_config(path, &config) {
                Ok(()) => info!(path = %path.display(), "default config written"),
                Err(err) => warn!(path = %path.display(), %err, "could not write default config"),
            }
            config
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "config unusable, using defaults");
            ScanConfig::default()
        }
    }
}

/// `Ok(None)` when the file does not exist.
pub fn load_config(path: &Path) -> Result<Option<ScanConfig>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|err| ScanwerkError::Config(format!("{}: {err}", path.display())))
}

pub fn persist_config(path: &Path, config: &ScanConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}
