//! `scoda.toml` configuration.
//!
//! ```toml
//! [registry]
//! packages_dir = "packages"
//!
//! [hub]
//! index = "hub/index.json"
//! ```
//!
//! Relative paths are taken from the directory holding `scoda.toml`.
//! Precedence, highest first: command-line flags, `SCODA_PACKAGES_DIR` /
//! `SCODA_HUB_INDEX`, the config file, the working directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "scoda.toml";
pub const ENV_PACKAGES_DIR: &str = "SCODA_PACKAGES_DIR";
pub const ENV_HUB_INDEX: &str = "SCODA_HUB_INDEX";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScodaConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory scanned for `.scoda` files.
    #[serde(default)]
    pub packages_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Static hub index file.
    #[serde(default)]
    pub index: Option<PathBuf>,
}

impl ScodaConfig {
    /// Find `scoda.toml` by walking up from `start_dir`.
    ///
    /// Returns `None` if no config file is found.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let config: ScodaConfig = toml::from_str(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((config, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }
}

/// Effective locations after applying every override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub packages_dir: PathBuf,
    pub hub_index: Option<PathBuf>,
}

impl Settings {
    /// Settings from the process environment and the nearest `scoda.toml`.
    pub fn load(
        cwd: &Path,
        packages_dir: Option<&Path>,
        hub_index: Option<&Path>,
    ) -> Result<Self> {
        Self::resolve(cwd, packages_dir, hub_index, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(
        cwd: &Path,
        packages_dir: Option<&Path>,
        hub_index: Option<&Path>,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let found = ScodaConfig::find_and_load(cwd)?;
        let (config, config_dir) = match found {
            Some((config, dir)) => (config, dir),
            None => (ScodaConfig::default(), cwd.to_path_buf()),
        };

        let from_env = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        let packages_dir = packages_dir
            .map(Path::to_path_buf)
            .or_else(|| from_env(ENV_PACKAGES_DIR))
            .or_else(|| config.registry.packages_dir.map(|p| config_dir.join(p)))
            .unwrap_or_else(|| cwd.to_path_buf());

        let hub_index = hub_index
            .map(Path::to_path_buf)
            .or_else(|| from_env(ENV_HUB_INDEX))
            .or_else(|| config.hub.index.map(|p| config_dir.join(p)));

        Ok(Settings {
            packages_dir,
            hub_index,
        })
    }
}
