//! Static hub index client.
//!
//! A hub publishes a JSON index of packages and their versions. This module
//! compares the index with what is installed locally, orders downloads so
//! dependencies arrive first, and installs files with checksum
//! verification. Fetching bytes is left to the caller; [`install`] takes any
//! reader.
//!
//! ```json
//! {
//!   "hub_version": "1.0",
//!   "generated_at": "2026-01-01T00:00:00Z",
//!   "packages": {
//!     "sample-data": {
//!       "latest": "1.1.0",
//!       "versions": {
//!         "1.1.0": {
//!           "download_url": "sample-data-1.1.0.scoda",
//!           "sha256": "…",
//!           "dependencies": {"dep-data": ">=0.2.0"}
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use scoda_core::version::compare_versions;
use scoda_core::ContentHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{RegistryError, Result};

/// The whole index document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubIndex {
    #[serde(default)]
    pub hub_version: Option<String>,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
    #[serde(default)]
    pub packages: BTreeMap<String, HubPackage>,
}

/// All published versions of one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubPackage {
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub versions: BTreeMap<String, HubEntry>,
}

/// One published version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// Package name to version constraint.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub engine_compat: Option<String>,
    #[serde(default)]
    pub scoda_format_version: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub source_release: Option<String>,
}

impl HubIndex {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RegistryError::HubIndex {
            detail: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| RegistryError::HubIndex {
            detail: format!("{}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }

    /// Latest version string and entry for `name`.
    pub fn latest(&self, name: &str) -> Option<(&str, &HubEntry)> {
        let package = self.packages.get(name)?;
        let latest = package.latest.as_deref()?;
        package.versions.get(latest).map(|entry| (latest, entry))
    }
}

/// One row of a local/hub comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStatusEntry {
    pub name: String,
    pub local_version: Option<String>,
    pub hub_version: String,
    pub size_bytes: Option<u64>,
}

/// Local packages sorted against the hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubComparison {
    /// On the hub, not installed.
    pub available: Vec<HubStatusEntry>,
    /// Installed, but the hub has a newer version.
    pub updatable: Vec<HubStatusEntry>,
    /// Installed at the hub version or newer.
    pub up_to_date: Vec<HubStatusEntry>,
}

/// Compare the hub against locally installed `name -> version`.
///
/// Packages with no downloadable latest version, or whose versions cannot be
/// compared, are left out.
pub fn compare_with_local(index: &HubIndex, local: &BTreeMap<String, String>) -> HubComparison {
    let mut result = HubComparison::default();
    for name in index.packages.keys() {
        let Some((hub_version, entry)) = index.latest(name) else {
            continue;
        };
        if entry.download_url.as_deref().map_or(true, str::is_empty) {
            continue;
        }

        let row = HubStatusEntry {
            name: name.clone(),
            local_version: local.get(name).cloned(),
            hub_version: hub_version.to_string(),
            size_bytes: entry.size_bytes,
        };
        match local.get(name) {
            None => result.available.push(row),
            Some(installed) => match compare_versions(hub_version, installed) {
                Ok(Ordering::Greater) => result.updatable.push(row),
                Ok(_) => result.up_to_date.push(row),
                Err(e) => debug!("hub: cannot compare {name}: {e}"),
            },
        }
    }
    result
}

/// A package to fetch, in install order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadStep {
    pub name: String,
    pub version: String,
    pub entry: HubEntry,
}

/// Everything that must be downloaded to install `name`, dependencies first.
///
/// Packages already installed at the hub version or newer are left out, as
/// are dependencies the hub does not list. Cycles are cut at the first
/// revisit.
pub fn resolve_download_order(
    index: &HubIndex,
    name: &str,
    local: &BTreeMap<String, String>,
) -> Vec<DownloadStep> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(index, name, local, &mut visited, &mut order);
    order
}

fn visit(
    index: &HubIndex,
    name: &str,
    local: &BTreeMap<String, String>,
    visited: &mut HashSet<String>,
    order: &mut Vec<DownloadStep>,
) {
    if !visited.insert(name.to_string()) {
        return;
    }
    let Some((version, entry)) = index.latest(name) else {
        debug!("hub: {name} not in index, skipping");
        return;
    };
    for dep in entry.dependencies.keys() {
        visit(index, dep, local, visited, order);
    }
    if needs_download(local.get(name).map(String::as_str), version) {
        order.push(DownloadStep {
            name: name.to_string(),
            version: version.to_string(),
            entry: entry.clone(),
        });
    }
}

fn needs_download(local: Option<&str>, hub: &str) -> bool {
    match local {
        None | Some("") => true,
        Some(installed) => {
            matches!(compare_versions(hub, installed), Ok(Ordering::Greater))
        }
    }
}

/// File name to install a download under: the last URL segment, with
/// `.scoda` appended when missing.
pub fn download_file_name(url: &str, package: &str) -> String {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    let base = if last.is_empty() { package } else { last };
    if base.ends_with(".scoda") {
        base.to_string()
    } else {
        format!("{base}.scoda")
    }
}

/// Resolve a `download_url` to a local file.
///
/// Plain paths and `file://` URLs are supported; relative paths are taken
/// from `base_dir`, normally the index file's directory.
pub fn local_source(base_dir: &Path, url: &str) -> Result<PathBuf> {
    let raw = match url.strip_prefix("file://") {
        Some(rest) => rest,
        None if url.contains("://") => {
            return Err(RegistryError::HubSource {
                detail: format!("unsupported download url '{url}'"),
            })
        }
        None => url,
    };
    let path = Path::new(raw);
    Ok(if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    })
}

/// Writes through to `inner` while hashing and counting the bytes.
struct HashingWriter<'a, W, P> {
    inner: W,
    hasher: Sha256,
    written: u64,
    progress: &'a mut P,
}

impl<W: Write, P: FnMut(u64)> Write for HashingWriter<'_, W, P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        (self.progress)(self.written);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Stream `reader` into `dest_dir/file_name`, verifying the SHA-256 digest.
///
/// Data is written to a temporary file in `dest_dir` and only renamed into
/// place once the digest matches; on mismatch the partial file is removed.
/// `progress` receives the running byte count.
pub fn install<R, P>(
    reader: &mut R,
    dest_dir: &Path,
    file_name: &str,
    expected_sha256: Option<&str>,
    mut progress: P,
) -> Result<PathBuf>
where
    R: Read,
    P: FnMut(u64),
{
    let path_like = file_name.contains(|c: char| c == '/' || c == '\\');
    if file_name.is_empty() || path_like || file_name.starts_with('.') {
        return Err(RegistryError::HubSource {
            detail: format!("refusing to install as '{file_name}'"),
        });
    }

    std::fs::create_dir_all(dest_dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".part")
        .tempfile_in(dest_dir)?;

    let mut sink = HashingWriter {
        inner: tmp.as_file_mut(),
        hasher: Sha256::new(),
        written: 0,
        progress: &mut progress,
    };
    io::copy(reader, &mut sink)?;
    sink.flush()?;
    let HashingWriter {
        hasher, written, ..
    } = sink;

    let actual = ContentHash::from_hasher(hasher);
    if let Some(expected) = expected_sha256.filter(|s| !s.trim().is_empty()) {
        if !actual.matches(expected) {
            // Dropping the temp file deletes it.
            drop(tmp);
            return Err(RegistryError::HubChecksum {
                file: file_name.to_string(),
                expected: expected.to_string(),
                actual: actual.0,
            });
        }
    }

    let dest = dest_dir.join(file_name);
    tmp.persist(&dest).map_err(|e| RegistryError::Io(e.error))?;
    info!("installed {} ({written} bytes)", dest.display());
    Ok(dest)
}
