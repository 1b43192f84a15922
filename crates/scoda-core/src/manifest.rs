//! The container manifest (`manifest.json`).
//!
//! The manifest is parsed and validated once when a container is opened.
//! Unknown top-level keys are preserved in [`Manifest::extra`] so that
//! producers can attach their own metadata without breaking older readers.
//!
//! Schema (format version 1.x):
//!
//! | key                    | type            | notes                              |
//! |------------------------|-----------------|------------------------------------|
//! | `format`               | string          | always `"scoda"`                   |
//! | `format_version`       | string          | `"1.0"`; any `1.x` is readable     |
//! | `name`                 | string          | package identity                   |
//! | `version`              | string          | dotted version                     |
//! | `data_file`            | string          | payload entry, usually `data.db`   |
//! | `record_count`         | integer         | rows outside metadata tables       |
//! | `data_checksum_sha256` | string, opt.    | lowercase hex SHA-256 of payload   |
//! | `dependencies`         | array           | see [`Dependency`]                 |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScodaError};
use crate::version;

/// Value of the `format` key.
pub const FORMAT: &str = "scoda";
/// Format version written by this crate.
pub const FORMAT_VERSION: &str = "1.0";

/// Archive entry holding the manifest.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Default archive entry holding the database payload.
pub const DATA_FILE: &str = "data.db";
/// Optional tool definitions entry.
pub const MCP_TOOLS_FILE: &str = "mcp_tools.json";
/// Optional changelog entry.
pub const CHANGELOG_FILE: &str = "CHANGELOG.md";

/// A declared dependency on another package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name of the package depended upon.
    pub name: String,
    /// Schema name the dependency is attached under. Defaults to `name`.
    #[serde(default)]
    pub alias: String,
    /// Version constraint such as `">=0.1.1,<0.2.0"`. Empty means any.
    #[serde(default, alias = "version")]
    pub version_constraint: String,
    /// Whether resolution fails when this dependency cannot be satisfied.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Dependency {
    /// A required dependency with no version constraint, aliased by its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Dependency {
            alias: name.clone(),
            name,
            version_constraint: String::new(),
            required: true,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.version_constraint = constraint.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// The effective alias (the name when no alias was declared).
    pub fn alias(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}

/// A parsed and validated container manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: String,
    pub format_version: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub data_file: String,
    pub record_count: u64,
    /// Absent in containers built before checksums were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_checksum_sha256: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub has_reference_spa: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_spa_path: Option<String>,
    #[serde(default)]
    pub has_mcp_tools: bool,
    #[serde(default)]
    pub has_changelog: bool,
    /// Keys this version of the format does not know about.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    /// A fresh manifest for `name`@`version` with format defaults filled in.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Manifest {
            format: FORMAT.to_string(),
            format_version: FORMAT_VERSION.to_string(),
            name: name.into(),
            version: version.into(),
            title: None,
            description: None,
            license: None,
            created_at: None,
            data_file: DATA_FILE.to_string(),
            record_count: 0,
            data_checksum_sha256: None,
            dependencies: Vec::new(),
            has_reference_spa: false,
            reference_spa_path: None,
            has_mcp_tools: false,
            has_changelog: false,
            extra: BTreeMap::new(),
        }
    }

    /// Parse and validate manifest JSON.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| ScodaError::format(format!("{MANIFEST_FILE}: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check required fields and fill in defaulted dependency aliases.
    pub fn validate(&mut self) -> Result<()> {
        if self.format != FORMAT {
            return Err(ScodaError::format(format!(
                "unexpected format '{}', expected '{FORMAT}'",
                self.format
            )));
        }

        let major = self.format_version.split('.').next().unwrap_or_default();
        if major != "1" {
            return Err(ScodaError::format(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }

        if self.name.trim().is_empty() {
            return Err(ScodaError::format("manifest name is required"));
        }

        version::parse_version(&self.version).map_err(|e| {
            ScodaError::format(format!("manifest version for '{}': {e}", self.name))
        })?;

        if self.data_file.trim().is_empty() {
            return Err(ScodaError::format("manifest data_file is required"));
        }

        for dep in &mut self.dependencies {
            if dep.name.trim().is_empty() {
                return Err(ScodaError::format(format!(
                    "dependency of '{}' has an empty name",
                    self.name
                )));
            }
            if dep.alias.is_empty() {
                dep.alias = dep.name.clone();
            }
        }

        Ok(())
    }

    /// Display title, falling back to the package name.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
