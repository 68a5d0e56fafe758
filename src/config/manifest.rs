//! Project manifest loading
//!
//! The manifest is either a `package.json` or a `rollkit.toml`; build
//! overrides live under the [`MANIFEST_KEY`] entry of either.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::BuildOptions;

/// Key under which build overrides live in the manifest
pub const MANIFEST_KEY: &str = "rollup";

/// Errors raised while reading the project manifest
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read manifest {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    rollup: BuildOptions,
}

/// Load the manifest override layer from `path`.
///
/// A missing file is an empty layer. Files ending in `.toml` are read as
/// TOML, everything else as JSON. Keys other than [`MANIFEST_KEY`] are ignored.
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<BuildOptions, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        debug!("No manifest at {}, using defaults", path.display());
        return Ok(BuildOptions::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let manifest: Manifest = if is_toml {
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    debug!("Loaded `{}` overrides from {}", MANIFEST_KEY, path.display());
    Ok(manifest.rollup)
}
