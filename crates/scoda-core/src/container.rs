//! `.scoda` container codec.
//!
//! A container is a ZIP archive:
//!
//! ```text
//! package.scoda
//! ├── manifest.json     identity, statistics, dependencies, checksum
//! ├── data.db           SQLite payload, stored byte-for-byte
//! ├── assets/...        optional files at caller-chosen paths
//! ├── mcp_tools.json    optional tool definitions
//! └── CHANGELOG.md      optional release notes
//! ```
//!
//! The manifest checksum covers the exact payload bytes, so a container can
//! be verified without extracting it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, ScodaError};
use crate::integrity::ContentHash;
use crate::manifest::{
    Dependency, Manifest, CHANGELOG_FILE, DATA_FILE, MANIFEST_FILE, MCP_TOOLS_FILE,
};

/// Key/value table a source database uses to describe itself.
pub const METADATA_TABLE: &str = "artifact_metadata";

/// Tables that describe the dataset rather than hold its records.
pub const METADATA_TABLES: [&str; 6] = [
    METADATA_TABLE,
    "provenance",
    "schema_descriptions",
    "ui_display_intent",
    "ui_queries",
    "ui_manifest",
];

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const DEFAULT_VERSION: &str = "1.0.0";

/// Caller-supplied manifest values. Every field that is set wins over what
/// the source database declares about itself.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageMetadata {
    pub name: Option<String>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub created_at: Option<String>,
    pub dependencies: Option<Vec<Dependency>>,
    pub has_reference_spa: Option<bool>,
    pub reference_spa_path: Option<String>,
    /// Additional manifest keys, copied through verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A file to embed at `archive_path` inside the container.
#[derive(Debug, Clone)]
pub struct AssetSource {
    pub archive_path: String,
    pub source: PathBuf,
}

impl AssetSource {
    pub fn new(archive_path: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        AssetSource {
            archive_path: archive_path.into(),
            source: source.into(),
        }
    }
}

/// Options for [`create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub metadata: PackageMetadata,
    pub extra_assets: Vec<AssetSource>,
    pub mcp_tools_path: Option<PathBuf>,
    pub changelog_path: Option<PathBuf>,
}

/// Build a container from a SQLite database.
///
/// The output is written to a temporary file beside `output` and renamed
/// into place, so a failed build never leaves a truncated container behind.
pub fn create(source_db: &Path, output: &Path, options: &CreateOptions) -> Result<Manifest> {
    if !source_db.is_file() {
        return Err(ScodaError::format(format!(
            "source database {} does not exist",
            source_db.display()
        )));
    }

    let payload = std::fs::read(source_db)?;
    if !payload.starts_with(SQLITE_HEADER) {
        return Err(ScodaError::format(format!(
            "{} is not a SQLite database",
            source_db.display()
        )));
    }

    let conn = Connection::open_with_flags(source_db, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| ScodaError::format(format!("opening {}: {e}", source_db.display())))?;
    let declared = read_source_metadata(&conn)
        .map_err(|e| ScodaError::format(format!("reading {METADATA_TABLE}: {e}")))?;
    let record_count = count_records(&conn)
        .map_err(|e| ScodaError::format(format!("counting records: {e}")))?;
    let now: String = conn.query_row(
        "SELECT strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        [],
        |row| row.get(0),
    )?;
    drop(conn);

    let meta = &options.metadata;
    let fallback_name = source_db
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());

    let mut manifest = Manifest::new(
        meta.name
            .clone()
            .or_else(|| declared.get("artifact_id").cloned())
            .unwrap_or(fallback_name),
        meta.version
            .clone()
            .or_else(|| declared.get("version").cloned())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
    );
    manifest.title = meta.title.clone().or_else(|| declared.get("name").cloned());
    manifest.description = meta
        .description
        .clone()
        .or_else(|| declared.get("description").cloned());
    manifest.license = meta.license.clone().or_else(|| declared.get("license").cloned());
    manifest.created_at = Some(
        meta.created_at
            .clone()
            .or_else(|| declared.get("created_at").cloned())
            .unwrap_or(now),
    );
    manifest.record_count = record_count;
    manifest.data_checksum_sha256 = Some(ContentHash::compute(&payload).0);
    manifest.dependencies = meta.dependencies.clone().unwrap_or_default();
    manifest.has_reference_spa = meta.has_reference_spa.unwrap_or(false);
    manifest.reference_spa_path = meta.reference_spa_path.clone();
    manifest.extra = meta.extra.clone();

    let mcp_tools = match &options.mcp_tools_path {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            serde_json::from_slice::<serde_json::Value>(&bytes).map_err(|e| {
                ScodaError::format(format!("{}: invalid JSON: {e}", path.display()))
            })?;
            manifest.has_mcp_tools = true;
            Some(bytes)
        }
        None => None,
    };
    let changelog = match &options.changelog_path {
        Some(path) => {
            manifest.has_changelog = true;
            Some(std::fs::read(path)?)
        }
        None => None,
    };

    for asset in &options.extra_assets {
        validate_archive_path(&asset.archive_path)?;
    }
    manifest.validate()?;

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let opts = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        zip.start_file(MANIFEST_FILE, opts)?;
        zip.write_all(manifest.to_json_pretty()?.as_bytes())?;

        zip.start_file(manifest.data_file.as_str(), opts)?;
        zip.write_all(&payload)?;

        for asset in &options.extra_assets {
            let bytes = std::fs::read(&asset.source)?;
            zip.start_file(asset.archive_path.as_str(), opts)?;
            zip.write_all(&bytes)?;
        }
        if let Some(bytes) = &mcp_tools {
            zip.start_file(MCP_TOOLS_FILE, opts)?;
            zip.write_all(bytes)?;
        }
        if let Some(bytes) = &changelog {
            zip.start_file(CHANGELOG_FILE, opts)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
    }
    tmp.persist(output).map_err(|e| ScodaError::Io(e.error))?;

    debug!(
        "packed {}@{} ({} records) into {}",
        manifest.name,
        manifest.version,
        manifest.record_count,
        output.display()
    );
    Ok(manifest)
}

/// Recompute the payload digest and compare it to the manifest.
///
/// Containers without a recorded checksum predate checksum support and are
/// accepted as-is.
pub fn verify(manifest: &Manifest, payload: &[u8]) -> bool {
    match &manifest.data_checksum_sha256 {
        Some(expected) => ContentHash::compute(payload).matches(expected),
        None => true,
    }
}

/// Lazy access to the entries of an opened container.
pub struct Assets {
    archive: ZipArchive<File>,
}

impl Assets {
    /// Names of every entry in the archive.
    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Read an entry, or `None` if it is absent.
    pub fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.archive.by_name(name) {
            Ok(mut entry) => {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for Assets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assets")
            .field("entries", &self.archive.len())
            .finish()
    }
}

/// An opened container: parsed manifest, payload bytes, and lazy access to
/// every other archive entry.
pub struct Container {
    path: PathBuf,
    manifest: Manifest,
    payload: Vec<u8>,
    assets: Assets,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl Container {
    /// Read a container from disk.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScodaError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| {
            ScodaError::format(format!("{} is not a container: {e}", path.display()))
        })?;

        let manifest_bytes = read_required(&mut archive, MANIFEST_FILE)?;
        let manifest = Manifest::parse(&manifest_bytes)?;
        let payload = read_required(&mut archive, &manifest.data_file)?;

        Ok(Container {
            path: path.to_path_buf(),
            manifest,
            payload,
            assets: Assets { archive },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Check the payload against the manifest checksum.
    pub fn verify(&self) -> bool {
        verify(&self.manifest, &self.payload)
    }

    /// Like [`Container::verify`] but reports the mismatch as an error.
    pub fn ensure_verified(&self) -> Result<()> {
        match &self.manifest.data_checksum_sha256 {
            Some(expected) => {
                let actual = ContentHash::compute(&self.payload);
                if actual.matches(expected) {
                    Ok(())
                } else {
                    Err(ScodaError::Checksum {
                        name: self.manifest.name.clone(),
                        expected: expected.clone(),
                        actual: actual.0,
                    })
                }
            }
            None => Ok(()),
        }
    }

    pub fn entry_names(&self) -> Vec<String> {
        self.assets.names()
    }

    pub fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        self.assets.read(name)
    }

    pub fn into_parts(self) -> (Manifest, Vec<u8>, Assets) {
        (self.manifest, self.payload, self.assets)
    }
}

fn read_required(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(ScodaError::format(format!("missing archive entry {name}")))
        }
        Err(e) => return Err(ScodaError::format(format!("reading {name}: {e}"))),
    };
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_source_metadata(conn: &Connection) -> rusqlite::Result<BTreeMap<String, String>> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [METADATA_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(BTreeMap::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT key, CAST(value AS TEXT) FROM {METADATA_TABLE} WHERE value IS NOT NULL"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect()
}

/// Sum the row counts of every data table.
fn count_records(conn: &Connection) -> rusqlite::Result<u64> {
    let tables: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut total = 0u64;
    for table in tables
        .iter()
        .filter(|t| !METADATA_TABLES.contains(&t.as_str()))
    {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        total += count.max(0) as u64;
    }
    Ok(total)
}

/// Quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn validate_archive_path(path: &str) -> Result<()> {
    let reserved = [MANIFEST_FILE, DATA_FILE, MCP_TOOLS_FILE, CHANGELOG_FILE];
    if path.is_empty() || path.contains('\\') || reserved.contains(&path) {
        return Err(ScodaError::format(format!("invalid asset path '{path}'")));
    }
    let ok = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(ScodaError::format(format!(
            "asset path '{path}' must be relative and stay inside the container"
        )));
    }
    Ok(())
}
