//! Fixtures shared by the unit tests.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::container::{self, CreateOptions};

/// Rows in `items` plus `categories`; metadata tables are not counted.
pub const SAMPLE_RECORDS: u64 = 5;

/// A small database describing itself through `artifact_metadata`.
pub fn sample_db(dir: &Path) -> PathBuf {
    let path = dir.join("sample.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE artifact_metadata (key TEXT PRIMARY KEY, value TEXT);
         INSERT INTO artifact_metadata VALUES
             ('artifact_id', 'sample-data'),
             ('name', 'Sample Data'),
             ('version', '1.0.0'),
             ('description', 'Generic sample dataset for testing');
         CREATE TABLE provenance (id INTEGER PRIMARY KEY, source TEXT);
         INSERT INTO provenance (source) VALUES ('unit test');
         CREATE TABLE categories (id INTEGER PRIMARY KEY, label TEXT);
         INSERT INTO categories (label) VALUES ('alpha'), ('beta');
         CREATE TABLE items (id INTEGER PRIMARY KEY, category_id INTEGER, name TEXT);
         INSERT INTO items (category_id, name) VALUES (1, 'one'), (1, 'two'), (2, 'three');",
    )
    .unwrap();
    path
}

/// Build `sample.db` into a container at `dir/<file_name>`.
pub fn sample_container(dir: &Path, file_name: &str) -> PathBuf {
    let db = sample_db(dir);
    let out = dir.join(file_name);
    container::create(&db, &out, &CreateOptions::default()).unwrap();
    out
}

/// Rewrite a container with one payload byte flipped, keeping its manifest.
pub fn corrupt_payload(path: &Path) {
    let mut entries = Vec::new();
    {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).unwrap();
            entries.push((entry.name().to_string(), buf));
        }
    }

    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, mut bytes) in entries {
        if name == "data.db" {
            let last = bytes.len() - 1;
            bytes[last] ^= 0xff;
        }
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(&bytes).unwrap();
    }
    zip.finish().unwrap();
}
