//! Open `.scoda` packages.
//!
//! Opening a package verifies its payload and extracts the database into a
//! private temporary directory so SQLite can work on a real file. The
//! directory lives exactly as long as the handle: [`ScodaPackage::close`]
//! removes it, and so does dropping the handle.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::container::{Assets, Container};
use crate::error::{Result, ScodaError};
use crate::integrity::ContentHash;
use crate::manifest::{Dependency, Manifest, CHANGELOG_FILE, MCP_TOOLS_FILE};

struct OpenState {
    manifest: Manifest,
    db_path: PathBuf,
    mcp_tools: Option<serde_json::Value>,
    changelog: Option<String>,
    assets: Assets,
    // Dropped last; removes the extracted files.
    tmp_dir: TempDir,
}

/// A handle on an opened package.
pub struct ScodaPackage {
    path: PathBuf,
    state: Option<OpenState>,
}

impl std::fmt::Debug for ScodaPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("ScodaPackage");
        s.field("path", &self.path);
        match &self.state {
            Some(state) => s
                .field("name", &state.manifest.name)
                .field("version", &state.manifest.version)
                .field("db_path", &state.db_path),
            None => s.field("closed", &true),
        };
        s.finish()
    }
}

impl ScodaPackage {
    /// Open and verify a package.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open a package, optionally skipping checksum verification.
    ///
    /// Nothing is extracted when verification fails.
    pub fn open_with(path: &Path, verify_checksum: bool) -> Result<Self> {
        let container = Container::open(path)?;
        if verify_checksum {
            container.ensure_verified()?;
        }
        let (manifest, payload, mut assets) = container.into_parts();

        let tmp_dir = tempfile::Builder::new().prefix("scoda_").tempdir()?;
        let file_name = Path::new(&manifest.data_file)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(crate::manifest::DATA_FILE));
        let db_path = tmp_dir.path().join(file_name);
        std::fs::write(&db_path, &payload)?;

        let mcp_tools = match assets.read(MCP_TOOLS_FILE)? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("{}: ignoring unreadable {MCP_TOOLS_FILE}: {e}", path.display());
                    None
                }
            },
            None => None,
        };
        let changelog = assets
            .read(CHANGELOG_FILE)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        debug!(
            "opened {}@{} into {}",
            manifest.name,
            manifest.version,
            tmp_dir.path().display()
        );

        Ok(ScodaPackage {
            path: path.to_path_buf(),
            state: Some(OpenState {
                manifest,
                db_path,
                mcp_tools,
                changelog,
                assets,
                tmp_dir,
            }),
        })
    }

    fn state(&self) -> Result<&OpenState> {
        self.state.as_ref().ok_or_else(|| ScodaError::PackageClosed {
            path: self.path.clone(),
        })
    }

    /// Path of the container this handle was opened from.
    pub fn source_path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn manifest(&self) -> Result<&Manifest> {
        Ok(&self.state()?.manifest)
    }

    pub fn name(&self) -> Result<&str> {
        Ok(&self.state()?.manifest.name)
    }

    pub fn version(&self) -> Result<&str> {
        Ok(&self.state()?.manifest.version)
    }

    /// Human-readable title, falling back to the name.
    pub fn title(&self) -> Result<&str> {
        Ok(self.state()?.manifest.display_title())
    }

    pub fn description(&self) -> Result<Option<&str>> {
        Ok(self.state()?.manifest.description.as_deref())
    }

    pub fn record_count(&self) -> Result<u64> {
        Ok(self.state()?.manifest.record_count)
    }

    pub fn dependencies(&self) -> Result<&[Dependency]> {
        Ok(&self.state()?.manifest.dependencies)
    }

    /// Extracted database file.
    pub fn db_path(&self) -> Result<&Path> {
        Ok(&self.state()?.db_path)
    }

    /// Temporary directory holding the extracted files.
    pub fn tmp_dir(&self) -> Result<&Path> {
        Ok(self.state()?.tmp_dir.path())
    }

    pub fn has_reference_spa(&self) -> Result<bool> {
        Ok(self.state()?.manifest.has_reference_spa)
    }

    pub fn mcp_tools(&self) -> Result<Option<&serde_json::Value>> {
        Ok(self.state()?.mcp_tools.as_ref())
    }

    pub fn changelog(&self) -> Result<Option<&str>> {
        Ok(self.state()?.changelog.as_deref())
    }

    /// Read any archive entry, e.g. `assets/spa/index.html`.
    pub fn asset(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path.clone();
        match self.state.as_mut() {
            Some(state) => state.assets.read(name),
            None => Err(ScodaError::PackageClosed { path }),
        }
    }

    pub fn asset_names(&self) -> Result<Vec<String>> {
        Ok(self.state()?.assets.names())
    }

    /// Re-hash the extracted database against the manifest checksum.
    ///
    /// Detects modification of the extracted copy after opening.
    pub fn verify_checksum(&self) -> Result<bool> {
        let state = self.state()?;
        match &state.manifest.data_checksum_sha256 {
            Some(expected) => Ok(ContentHash::compute_file(&state.db_path)?.matches(expected)),
            None => Ok(true),
        }
    }

    /// Release the temporary directory. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(state) = self.state.take() {
            let dir = state.tmp_dir.path().to_path_buf();
            if let Err(e) = state.tmp_dir.close() {
                warn!("failed to remove {}: {e}", dir.display());
            }
        }
    }
}
