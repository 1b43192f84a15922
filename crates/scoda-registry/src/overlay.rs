//! Per-package overlay databases.
//!
//! Canonical data is never written to. User annotations and preferences go
//! into a separate SQLite file beside the container, `<stem>_overlay.db`,
//! which the registry attaches under the `overlay` schema name. The helpers
//! here work on any connection that has the overlay attached.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Schema name the overlay is attached under.
pub const OVERLAY_ALIAS: &str = "overlay";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user_annotations (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type     TEXT NOT NULL,
    entity_id       INTEGER NOT NULL,
    entity_name     TEXT,
    annotation_type TEXT NOT NULL,
    content         TEXT NOT NULL,
    author          TEXT,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_annotations_entity
    ON user_annotations (entity_type, entity_id);
CREATE TABLE IF NOT EXISTS overlay_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT
);
";

/// Preferences live in `overlay_metadata` under `pref_<key>`.
const PREF_PREFIX: &str = "pref_";

/// Overlay file for a container: `<stem>_overlay.db` in the same directory.
pub fn overlay_path_for(canonical: &Path) -> PathBuf {
    let stem = canonical
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    canonical.with_file_name(format!("{stem}_overlay.db"))
}

/// Create the overlay at `path` if needed. Returns `true` when the file was
/// newly created.
pub fn ensure_overlay(path: &Path, canonical_version: &str) -> Result<bool> {
    let created = !path.exists();
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    if created {
        conn.execute(
            "INSERT OR IGNORE INTO overlay_metadata (key, value) VALUES
                 ('canonical_version', ?1),
                 ('created_at', datetime('now'))",
            [canonical_version],
        )?;
        debug!("created overlay {}", path.display());
    }
    Ok(created)
}

/// A stored annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub entity_name: Option<String>,
    pub annotation_type: String,
    pub content: String,
    pub author: Option<String>,
    pub created_at: String,
}

/// Fields for a new annotation.
#[derive(Debug, Clone, Default)]
pub struct NewAnnotation {
    pub entity_type: String,
    pub entity_id: i64,
    pub entity_name: Option<String>,
    pub annotation_type: String,
    pub content: String,
    pub author: Option<String>,
}

/// Insert an annotation and return its id.
pub fn add_annotation(conn: &Connection, note: &NewAnnotation) -> Result<i64> {
    conn.execute(
        "INSERT INTO overlay.user_annotations
             (entity_type, entity_id, entity_name, annotation_type, content, author)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            note.entity_type,
            note.entity_id,
            note.entity_name,
            note.annotation_type,
            note.content,
            note.author
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Annotations on one entity, oldest first.
pub fn list_annotations(
    conn: &Connection,
    entity_type: &str,
    entity_id: i64,
) -> Result<Vec<Annotation>> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, entity_name, annotation_type, content,
                author, created_at
         FROM overlay.user_annotations
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![entity_type, entity_id], |row| {
        Ok(Annotation {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            entity_name: row.get(3)?,
            annotation_type: row.get(4)?,
            content: row.get(5)?,
            author: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Delete an annotation. Returns whether a row was removed.
pub fn delete_annotation(conn: &Connection, id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM overlay.user_annotations WHERE id = ?1", [id])?;
    Ok(n > 0)
}

pub fn set_preference(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO overlay.overlay_metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![format!("{PREF_PREFIX}{key}"), value],
    )?;
    Ok(())
}

pub fn get_preference(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM overlay.overlay_metadata WHERE key = ?1",
            [format!("{PREF_PREFIX}{key}")],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

/// Read a raw `overlay_metadata` entry such as `canonical_version`.
pub fn overlay_metadata(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM overlay.overlay_metadata WHERE key = ?1",
            [key],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached(dir: &Path) -> Connection {
        let path = dir.join("pkg_overlay.db");
        ensure_overlay(&path, "1.0.0").unwrap();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "ATTACH DATABASE ?1 AS overlay",
            [path.to_string_lossy().into_owned()],
        )
        .unwrap();
        conn
    }

    #[test]
    fn overlay_path_sits_beside_container() {
        assert_eq!(
            overlay_path_for(Path::new("/data/pkgs/sample.scoda")),
            PathBuf::from("/data/pkgs/sample_overlay.db")
        );
    }

    #[test]
    fn ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_overlay.db");
        assert!(ensure_overlay(&path, "1.0.0").unwrap());
        assert!(!ensure_overlay(&path, "2.0.0").unwrap());

        let conn = Connection::open(&path).unwrap();
        let version: String = conn
            .query_row(
                "SELECT value FROM overlay_metadata WHERE key = 'canonical_version'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(version, "1.0.0");
    }

    #[test]
    fn annotation_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let conn = attached(dir.path());

        let id = add_annotation(
            &conn,
            &NewAnnotation {
                entity_type: "item".to_string(),
                entity_id: 7,
                entity_name: Some("seven".to_string()),
                annotation_type: "note".to_string(),
                content: "check this".to_string(),
                author: None,
            },
        )
        .unwrap();

        let notes = list_annotations(&conn, "item", 7).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, id);
        assert_eq!(notes[0].content, "check this");
        assert!(!notes[0].created_at.is_empty());
        assert!(list_annotations(&conn, "item", 8).unwrap().is_empty());

        assert!(delete_annotation(&conn, id).unwrap());
        assert!(!delete_annotation(&conn, id).unwrap());
    }

    #[test]
    fn preferences_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let conn = attached(dir.path());
        assert_eq!(get_preference(&conn, "theme").unwrap(), None);
        set_preference(&conn, "theme", "dark").unwrap();
        set_preference(&conn, "theme", "light").unwrap();
        assert_eq!(get_preference(&conn, "theme").unwrap().as_deref(), Some("light"));
        assert_eq!(
            overlay_metadata(&conn, "pref_theme").unwrap().as_deref(),
            Some("light")
        );
        assert_eq!(
            overlay_metadata(&conn, "canonical_version").unwrap().as_deref(),
            Some("1.0.0")
        );
    }
}
