// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which scanner backend the server drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local and network scanners through libsane. Needs a build with the
    /// `sane` feature; without it the server runs with no scanners.
    Sane,
    /// Virtual devices producing blank pages (desktop/CI).
    Simulated,
    /// No scanner backend; every hardware call fails.
    None,
}

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory receiving finished PDFs.
    pub scan_dir: PathBuf,
    /// Resolution preselected in the scan form when the device offers it.
    pub preferred_resolution: u32,
    /// Colour mode preselected in the scan form.
    pub preferred_mode: String,
    /// Source preselected in the scan form.
    pub preferred_source: String,
    pub backend: BackendKind,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_dir: home_dir().join("Scans"),
            preferred_resolution: 300,
            preferred_mode: "Gray".into(),
            preferred_source: "ADF".into(),
            backend: BackendKind::Sane,
        }
    }
}

/// Home directory from `HOME`, falling back to the working directory.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &std::path::Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
