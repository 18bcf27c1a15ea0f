// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Configuration file resolution.

use std::path::{Path, PathBuf};

use schemwerk_core::{PipelineConfig, PipelineError};
use tracing::{debug, info};

const CONFIG_FILENAME: &str = "config.json";

/// Default location of the configuration file:
/// `$XDG_CONFIG_HOME/schemwerk/config.json`, else `~/.config/schemwerk/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    config_base(
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
    .map(|base| base.join("schemwerk").join(CONFIG_FILENAME))
}

fn config_base(xdg: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
    xdg.filter(|p| !p.as_os_str().is_empty())
        .or_else(|| home.map(|h| h.join(".config")))
}

/// Load the pipeline configuration.
///
/// An explicit path must exist and parse. Without one, the default location
/// is used when a file is there, otherwise built-in defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig, PipelineError> {
    if let Some(path) = explicit {
        info!(path = %path.display(), "Loading configuration");
        return PipelineConfig::from_json_file(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            info!(path = %path.display(), "Loading configuration");
            PipelineConfig::from_json_file(&path)
        }
        _ => {
            debug!("No configuration file; using defaults");
            Ok(PipelineConfig::default())
        }
    }
}
