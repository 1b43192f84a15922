//! The package catalog.
//!
//! A [`Registry`] owns every opened package and every resolved connection.
//! `get_db` returns a connection to the package's extracted database with
//! each satisfied dependency attached under its alias and the package's
//! overlay attached as `overlay`. Connections are built once and cached
//! until [`Registry::close_all`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use scoda_core::container::quote_ident;
use scoda_core::version;
use scoda_core::{Manifest, ScodaPackage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::overlay::{self, OVERLAY_ALIAS};
use crate::resolution::{self, Attachment, Candidate};

/// File extension of containers picked up by [`Registry::scan`].
pub const CONTAINER_EXTENSION: &str = "scoda";

/// Catalog listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub record_count: u64,
    pub has_dependencies: bool,
    pub source_type: String,
    pub deps: Vec<DependencySummary>,
}

/// A declared dependency as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySummary {
    pub name: String,
    pub alias: String,
}

struct CatalogEntry {
    package: ScodaPackage,
    manifest: Manifest,
    db_path: PathBuf,
    canonical_path: PathBuf,
    overlay_path: PathBuf,
}

impl CatalogEntry {
    fn summary(&self) -> PackageSummary {
        let m = &self.manifest;
        PackageSummary {
            name: m.name.clone(),
            title: m.display_title().to_string(),
            version: m.version.clone(),
            description: m.description.clone(),
            record_count: m.record_count,
            has_dependencies: !m.dependencies.is_empty(),
            source_type: "scoda".to_string(),
            deps: m
                .dependencies
                .iter()
                .map(|d| DependencySummary {
                    name: d.name.clone(),
                    alias: d.alias().to_string(),
                })
                .collect(),
        }
    }
}

struct Resolved {
    conn: Connection,
    attachments: Vec<Attachment>,
}

/// Catalog of opened packages plus their resolved connections.
#[derive(Default)]
pub struct Registry {
    // Declared before `catalog` so connections close before the extracted
    // files they point at are removed.
    connections: HashMap<String, Resolved>,
    catalog: BTreeMap<String, CatalogEntry>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("packages", &self.catalog.keys().collect::<Vec<_>>())
            .field("connected", &self.connections.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the catalog from the containers directly inside `dir`.
    ///
    /// Containers that fail to open or verify are logged and skipped. When
    /// two containers declare the same name, the higher version is kept, and
    /// on a tie the first in file-name order. Returns the number of packages
    /// registered.
    pub fn scan(&mut self, dir: &Path) -> Result<usize> {
        self.close_all();

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file() && p.extension().is_some_and(|ext| ext == CONTAINER_EXTENSION)
            })
            .collect();
        paths.sort();

        for path in paths {
            let package = match ScodaPackage::open(&path) {
                Ok(package) => package,
                Err(e) => {
                    warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            let entry = match Self::entry_for(package, &path) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            if let Some(existing) = self.catalog.get(&entry.manifest.name) {
                let newer = version::compare_versions(
                    &entry.manifest.version,
                    &existing.manifest.version,
                )
                .is_ok_and(|ord| ord == Ordering::Greater);
                let (kept, dropped) = if newer {
                    (&entry, existing)
                } else {
                    (existing, &entry)
                };
                warn!(
                    "skipping {}: package '{}' {} superseded by {} from {}",
                    dropped.canonical_path.display(),
                    dropped.manifest.name,
                    dropped.manifest.version,
                    kept.manifest.version,
                    kept.canonical_path.display()
                );
                if !newer {
                    continue;
                }
            }
            debug!("registered {} from {}", entry.manifest.name, path.display());
            self.catalog.insert(entry.manifest.name.clone(), entry);
        }

        info!("scanned {}: {} package(s)", dir.display(), self.catalog.len());
        Ok(self.catalog.len())
    }

    /// Register one container. Unlike [`Registry::scan`], failures are
    /// returned to the caller. A package already registered under the same
    /// name is replaced.
    pub fn register_path(&mut self, path: &Path) -> Result<String> {
        let package = ScodaPackage::open(path)?;
        let entry = Self::entry_for(package, path)?;
        let name = entry.manifest.name.clone();

        if self.catalog.contains_key(&name) {
            // Cached connections may have the old extraction attached.
            self.connections.clear();
            debug!("replacing package {name} with {}", path.display());
        }
        self.catalog.insert(name.clone(), entry);
        Ok(name)
    }

    fn entry_for(package: ScodaPackage, path: &Path) -> Result<CatalogEntry> {
        let manifest = package.manifest()?.clone();
        let db_path = package.db_path()?.to_path_buf();
        Ok(CatalogEntry {
            package,
            manifest,
            db_path,
            canonical_path: path.to_path_buf(),
            overlay_path: overlay::overlay_path_for(path),
        })
    }

    /// Snapshot of the catalog, ordered by name.
    pub fn list_packages(&self) -> Vec<PackageSummary> {
        self.catalog.values().map(CatalogEntry::summary).collect()
    }

    /// Installed `name -> version`, as the hub client expects.
    pub fn local_versions(&self) -> BTreeMap<String, String> {
        self.catalog
            .iter()
            .map(|(name, e)| (name.clone(), e.manifest.version.clone()))
            .collect()
    }

    /// Summary of one package.
    pub fn info(&self, name: &str) -> Result<PackageSummary> {
        Ok(self.entry(name)?.summary())
    }

    fn entry(&self, name: &str) -> Result<&CatalogEntry> {
        self.catalog
            .get(name)
            .ok_or_else(|| RegistryError::UnknownPackage {
                name: name.to_string(),
            })
    }

    /// Connection to `name` with its dependencies and overlay attached.
    pub fn get_db(&mut self, name: &str) -> Result<&Connection> {
        self.entry(name)?;
        if !self.connections.contains_key(name) {
            let resolved = self.connect(name)?;
            self.connections.insert(name.to_string(), resolved);
        }
        self.connections
            .get(name)
            .map(|r| &r.conn)
            .ok_or_else(|| RegistryError::UnknownPackage {
                name: name.to_string(),
            })
    }

    fn connect(&self, name: &str) -> Result<Resolved> {
        let entry = self.entry(name)?;
        let attachments =
            resolution::plan_attachments(name, &entry.manifest.dependencies, |dep| {
                self.catalog.get(dep).map(|e| Candidate {
                    version: e.manifest.version.as_str(),
                    path: e.db_path.as_path(),
                })
            })?;

        let conn = Connection::open(&entry.db_path)?;
        for attachment in &attachments {
            attach(&conn, &attachment.path, &attachment.alias)?;
            debug!("{name}: attached {} as {}", attachment.name, attachment.alias);
        }

        overlay::ensure_overlay(&entry.overlay_path, &entry.manifest.version)?;
        attach(&conn, &entry.overlay_path, OVERLAY_ALIAS)?;

        Ok(Resolved { conn, attachments })
    }

    /// Tool definitions bundled with `name`, if any.
    pub fn get_mcp_tools(&self, name: &str) -> Option<&serde_json::Value> {
        self.catalog
            .get(name)
            .and_then(|e| e.package.mcp_tools().ok().flatten())
    }

    /// The open package handle for `name`.
    pub fn package(&self, name: &str) -> Option<&ScodaPackage> {
        self.catalog.get(name).map(|e| &e.package)
    }

    /// The container file `name` was loaded from.
    pub fn canonical_path(&self, name: &str) -> Option<&Path> {
        self.catalog.get(name).map(|e| e.canonical_path.as_path())
    }

    pub fn overlay_path(&self, name: &str) -> Option<&Path> {
        self.catalog.get(name).map(|e| e.overlay_path.as_path())
    }

    /// Dependencies attached on the cached connection, in attach order.
    /// `None` until [`Registry::get_db`] has succeeded for `name`.
    pub fn resolved_aliases(&self, name: &str) -> Option<&[Attachment]> {
        self.connections.get(name).map(|r| r.attachments.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalog.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Drop every cached connection, close every package and empty the
    /// catalog. Safe to call repeatedly.
    pub fn close_all(&mut self) {
        for (name, resolved) in self.connections.drain() {
            if let Err((_, e)) = resolved.conn.close() {
                warn!("closing connection for {name}: {e}");
            }
        }
        for (_, mut entry) in std::mem::take(&mut self.catalog) {
            entry.package.close();
        }
    }

    /// Return to the freshly constructed state.
    pub fn reset(&mut self) {
        self.close_all();
    }
}

fn attach(conn: &Connection, path: &Path, alias: &str) -> Result<()> {
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", quote_ident(alias)),
        [path.to_string_lossy().into_owned()],
    )?;
    Ok(())
}
