//! Resolver configuration.
//!
//! Settings live in the `[resolve]` table of the project manifest, next to
//! the package tables the resolver ignores. Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Resolver settings, read from the `[resolve]` table of a project manifest.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Name of the function resolution starts from.
    pub entry_point: String,
    /// Modules whose functions are treated as declared in the root block.
    pub standard_modules: Vec<String>,
    /// Run early verification before resolution.
    pub early_verification: bool,
    /// Detach functions not reached from the entry point.
    pub eliminate_dead_code: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        ResolveConfig {
            entry_point: "main".to_string(),
            standard_modules: Vec::new(),
            early_verification: true,
            eliminate_dead_code: true,
        }
    }
}

/// Failure to load a [`ResolveConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse resolver configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Default, Deserialize)]
struct ManifestTables {
    #[serde(default)]
    resolve: ResolveConfig,
}

impl ResolveConfig {
    /// Parse the `[resolve]` table of a manifest. Other tables are ignored;
    /// a missing table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<ResolveConfig, ConfigError> {
        let tables: ManifestTables = toml::from_str(content)?;
        Ok(tables.resolve)
    }

    /// Read and parse a manifest from disk.
    pub fn from_file(path: &Path) -> Result<ResolveConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_toml_str(&content)
    }
}
