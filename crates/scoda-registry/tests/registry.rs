//! End-to-end registry tests against real containers on disk.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use scoda_core::{CreateOptions, Dependency, PackageMetadata, ScodaPackage};
use scoda_registry::{overlay, NewAnnotation, Registry, RegistryError};
use tempfile::TempDir;

/// Build `<dir>/<file>` holding `rows` rows in `table`.
fn make_package(
    dir: &Path,
    file: &str,
    name: &str,
    version: &str,
    dependencies: Vec<Dependency>,
    table: &str,
    rows: usize,
) -> PathBuf {
    let src_dir = dir.join("src");
    std::fs::create_dir_all(&src_dir).unwrap();
    let db = src_dir.join(format!("{file}.db"));
    let conn = Connection::open(&db).unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE artifact_metadata (key TEXT PRIMARY KEY, value TEXT);
         CREATE TABLE {table} (id INTEGER PRIMARY KEY, label TEXT);"
    ))
    .unwrap();
    conn.execute(
        "INSERT INTO artifact_metadata VALUES ('artifact_id', ?1), ('version', ?2)",
        [name, version],
    )
    .unwrap();
    for i in 0..rows {
        conn.execute(
            &format!("INSERT INTO {table} (label) VALUES (?1)"),
            [format!("row {i}")],
        )
        .unwrap();
    }
    drop(conn);

    let out = dir.join(file);
    let options = CreateOptions {
        metadata: PackageMetadata {
            dependencies: Some(dependencies),
            ..Default::default()
        },
        ..Default::default()
    };
    scoda_core::create(&db, &out, &options).unwrap();
    out
}

/// Flip one payload byte while keeping the manifest and its checksum.
fn corrupt_payload(path: &Path) {
    let mut entries = Vec::new();
    {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).unwrap();
            entries.push((entry.name().to_string(), buf));
        }
    }
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, mut bytes) in entries {
        if name == "data.db" {
            bytes[200] ^= 0x55;
        }
        zip.start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&bytes).unwrap();
    }
    zip.finish().unwrap();
}

fn attached_schemas(conn: &Connection) -> Vec<String> {
    let mut stmt = conn.prepare("PRAGMA database_list").unwrap();
    let rows = stmt.query_map([], |row| row.get::<_, String>(1)).unwrap();
    rows.map(Result::unwrap).collect()
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

fn scanned(dir: &TempDir) -> Registry {
    let mut registry = Registry::new();
    registry.scan(dir.path()).unwrap();
    registry
}

#[test]
fn end_to_end_dependency_attachment() {
    let dir = tempfile::tempdir().unwrap();
    let dep_path = make_package(dir.path(), "dep.scoda", "dep", "1.0.0", vec![], "taxa", 4);
    make_package(
        dir.path(),
        "main.scoda",
        "main",
        "1.0.0",
        vec![Dependency::new("dep").with_alias("d").with_constraint(">=1.0.0")],
        "records",
        2,
    );

    let mut registry = scanned(&dir);
    assert_eq!(registry.len(), 2);

    let direct = {
        let pkg = ScodaPackage::open(&dep_path).unwrap();
        let conn = Connection::open(pkg.db_path().unwrap()).unwrap();
        count(&conn, "taxa")
    };

    let conn = registry.get_db("main").unwrap();
    assert_eq!(count(conn, "d.taxa"), direct);
    assert_eq!(count(conn, "records"), 2);

    let schemas = attached_schemas(conn);
    assert!(schemas.contains(&"d".to_string()));
    assert!(schemas.contains(&"overlay".to_string()));

    let aliases: Vec<&str> = registry
        .resolved_aliases("main")
        .unwrap()
        .iter()
        .map(|a| a.alias.as_str())
        .collect();
    assert_eq!(aliases, ["d"]);
}

#[test]
fn connections_are_cached_per_package() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "a.scoda", "a", "1.0.0", vec![], "t", 1);
    let mut registry = scanned(&dir);

    let first = registry.get_db("a").unwrap() as *const Connection;
    let second = registry.get_db("a").unwrap() as *const Connection;
    assert_eq!(first, second);
}

#[test]
fn required_dependency_missing() {
    let dir = tempfile::tempdir().unwrap();
    make_package(
        dir.path(),
        "main.scoda",
        "main",
        "1.0.0",
        vec![Dependency::new("ghost")],
        "t",
        1,
    );
    make_package(dir.path(), "other.scoda", "other", "1.0.0", vec![], "t", 1);
    let mut registry = scanned(&dir);

    match registry.get_db("main") {
        Err(RegistryError::Dependency { package, detail }) => {
            assert_eq!(package, "main");
            assert!(detail.contains("ghost"), "{detail}");
        }
        other => panic!("expected dependency error, got {other:?}"),
    }
    assert!(registry.get_db("other").is_ok());
}

#[test]
fn optional_dependency_missing() {
    let dir = tempfile::tempdir().unwrap();
    make_package(
        dir.path(),
        "main.scoda",
        "main",
        "1.0.0",
        vec![Dependency::new("ghost").with_alias("g").optional()],
        "t",
        1,
    );
    let mut registry = scanned(&dir);

    let conn = registry.get_db("main").unwrap();
    let schemas = attached_schemas(conn);
    assert!(!schemas.contains(&"g".to_string()));
    assert!(schemas.contains(&"overlay".to_string()));
}

#[test]
fn hyphenated_names_attach_under_default_alias() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "dep-data.scoda", "dep-data", "1.0.0", vec![], "taxa", 3);
    make_package(
        dir.path(),
        "main.scoda",
        "main",
        "1.0.0",
        vec![
            Dependency::new("dep-data"),
            Dependency::new("extra-data").optional(),
        ],
        "t",
        1,
    );
    let mut registry = scanned(&dir);

    let conn = registry.get_db("main").unwrap();
    assert_eq!(count(conn, "\"dep-data\".taxa"), 3);
    let schemas = attached_schemas(conn);
    assert!(schemas.contains(&"dep-data".to_string()));
    assert!(!schemas.contains(&"extra-data".to_string()));
}

#[test]
fn version_constraint_gates_attachment() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "dep.scoda", "dep", "0.3.0", vec![], "taxa", 3);
    make_package(
        dir.path(),
        "strict.scoda",
        "strict",
        "1.0.0",
        vec![Dependency::new("dep").with_constraint(">=1.0.0")],
        "t",
        1,
    );
    make_package(
        dir.path(),
        "loose.scoda",
        "loose",
        "1.0.0",
        vec![Dependency::new("dep").with_constraint(">=0.2.0,<1.0.0")],
        "t",
        1,
    );
    let mut registry = scanned(&dir);

    let err = registry.get_db("strict").unwrap_err();
    assert!(matches!(err, RegistryError::Dependency { .. }), "{err}");

    let conn = registry.get_db("loose").unwrap();
    assert!(attached_schemas(conn).contains(&"dep".to_string()));
    assert_eq!(count(conn, "dep.taxa"), 3);
}

#[test]
fn scan_skips_corrupted_containers() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "good.scoda", "good", "1.0.0", vec![], "t", 1);
    let bad = make_package(dir.path(), "bad.scoda", "bad", "1.0.0", vec![], "t", 1);
    corrupt_payload(&bad);
    std::fs::write(dir.path().join("junk.scoda"), b"not a zip").unwrap();

    let registry = scanned(&dir);
    let names: Vec<String> = registry.list_packages().into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["good"]);

    let mut single = Registry::new();
    let err = single.register_path(&bad).unwrap_err();
    assert!(err.is_checksum(), "{err}");
}

#[test]
fn overlays_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "a.scoda", "a", "1.0.0", vec![], "t", 1);
    make_package(dir.path(), "b.scoda", "b", "1.0.0", vec![], "t", 1);
    let mut registry = scanned(&dir);

    assert_ne!(registry.overlay_path("a"), registry.overlay_path("b"));
    assert_eq!(
        registry.overlay_path("a").unwrap(),
        dir.path().join("a_overlay.db")
    );

    let conn = registry.get_db("a").unwrap();
    overlay::add_annotation(
        conn,
        &NewAnnotation {
            entity_type: "t".to_string(),
            entity_id: 1,
            annotation_type: "note".to_string(),
            content: "only in a".to_string(),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(overlay::list_annotations(conn, "t", 1).unwrap().len(), 1);

    let conn = registry.get_db("b").unwrap();
    assert!(overlay::list_annotations(conn, "t", 1).unwrap().is_empty());
    assert_eq!(
        overlay::overlay_metadata(conn, "canonical_version")
            .unwrap()
            .as_deref(),
        Some("1.0.0")
    );
}

#[test]
fn overlay_survives_rescan() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "a.scoda", "a", "1.0.0", vec![], "t", 1);
    let mut registry = scanned(&dir);

    overlay::set_preference(registry.get_db("a").unwrap(), "sort", "name").unwrap();
    registry.scan(dir.path()).unwrap();
    let conn = registry.get_db("a").unwrap();
    assert_eq!(
        overlay::get_preference(conn, "sort").unwrap().as_deref(),
        Some("name")
    );
}

#[test]
fn alias_collisions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "x.scoda", "x", "1.0.0", vec![], "t", 1);
    make_package(dir.path(), "y.scoda", "y", "1.0.0", vec![], "t", 1);
    make_package(
        dir.path(),
        "dup.scoda",
        "dup",
        "1.0.0",
        vec![
            Dependency::new("x").with_alias("shared"),
            Dependency::new("y").with_alias("shared"),
        ],
        "t",
        1,
    );
    make_package(
        dir.path(),
        "clash.scoda",
        "clash",
        "1.0.0",
        vec![Dependency::new("x").with_alias("overlay")],
        "t",
        1,
    );
    let mut registry = scanned(&dir);

    assert!(matches!(
        registry.get_db("dup"),
        Err(RegistryError::Dependency { .. })
    ));
    assert!(matches!(
        registry.get_db("clash"),
        Err(RegistryError::Dependency { .. })
    ));
}

#[test]
fn dependency_cycles_attach_one_level() {
    let dir = tempfile::tempdir().unwrap();
    make_package(
        dir.path(),
        "p.scoda",
        "p",
        "1.0.0",
        vec![Dependency::new("q")],
        "pt",
        1,
    );
    make_package(
        dir.path(),
        "q.scoda",
        "q",
        "1.0.0",
        vec![Dependency::new("p")],
        "qt",
        2,
    );
    let mut registry = scanned(&dir);

    let conn = registry.get_db("p").unwrap();
    assert_eq!(count(conn, "q.qt"), 2);
    assert!(!attached_schemas(conn).contains(&"p".to_string()));
}

#[test]
fn unknown_package() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = scanned(&dir);
    assert!(registry.is_empty());
    assert!(matches!(
        registry.get_db("nope"),
        Err(RegistryError::UnknownPackage { .. })
    ));
    assert!(matches!(
        registry.info("nope"),
        Err(RegistryError::UnknownPackage { .. })
    ));
    assert!(registry.get_mcp_tools("nope").is_none());
}

#[test]
fn listing_reports_declared_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    make_package(
        dir.path(),
        "main.scoda",
        "main",
        "2.0",
        vec![Dependency::new("dep").with_alias("d").optional()],
        "t",
        3,
    );
    let registry = scanned(&dir);

    let info = registry.info("main").unwrap();
    assert_eq!(info.version, "2.0");
    assert_eq!(info.title, "main");
    assert_eq!(info.record_count, 3);
    assert!(info.has_dependencies);
    assert_eq!(info.source_type, "scoda");
    assert_eq!(info.deps[0].name, "dep");
    assert_eq!(info.deps[0].alias, "d");
    assert_eq!(registry.local_versions()["main"], "2.0");
}

#[test]
fn duplicate_names_keep_highest_version() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "base-0.1.0.scoda", "base", "0.1.0", vec![], "t", 1);
    make_package(dir.path(), "base-0.2.0.scoda", "base", "0.2.0", vec![], "t", 2);
    make_package(dir.path(), "a.scoda", "same", "2.0.0", vec![], "t", 1);
    make_package(dir.path(), "b.scoda", "same", "1.0.0", vec![], "t", 1);
    let mut registry = scanned(&dir);

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.info("base").unwrap().version, "0.2.0");
    assert_eq!(
        registry.canonical_path("base").unwrap(),
        dir.path().join("base-0.2.0.scoda")
    );
    assert_eq!(count(registry.get_db("base").unwrap(), "t"), 2);
    assert_eq!(registry.info("same").unwrap().version, "2.0.0");
}

#[test]
fn duplicate_names_at_same_version_keep_first_file() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "a.scoda", "same", "1.0.0", vec![], "t", 1);
    make_package(dir.path(), "b.scoda", "same", "1.0", vec![], "t", 1);
    let registry = scanned(&dir);

    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.canonical_path("same").unwrap(),
        dir.path().join("a.scoda")
    );
}

#[test]
fn register_path_replaces_existing_entry() {
    let dir = tempfile::tempdir().unwrap();
    let v1 = make_package(dir.path(), "v1.scoda", "pkg", "1.0.0", vec![], "t", 1);
    let other = tempfile::tempdir().unwrap();
    let v2 = make_package(other.path(), "v2.scoda", "pkg", "2.0.0", vec![], "t", 5);

    let mut registry = Registry::new();
    assert_eq!(registry.register_path(&v1).unwrap(), "pkg");
    registry.get_db("pkg").unwrap();
    assert_eq!(registry.register_path(&v2).unwrap(), "pkg");

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.info("pkg").unwrap().version, "2.0.0");
    assert!(registry.resolved_aliases("pkg").is_none());
    assert_eq!(count(registry.get_db("pkg").unwrap(), "t"), 5);
}

#[test]
fn close_all_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    make_package(dir.path(), "a.scoda", "a", "1.0.0", vec![], "t", 1);
    let mut registry = scanned(&dir);

    let extracted = registry.package("a").unwrap().tmp_dir().unwrap().to_path_buf();
    registry.get_db("a").unwrap();
    registry.close_all();
    registry.close_all();

    assert!(registry.is_empty());
    assert!(!extracted.exists());
    assert!(matches!(
        registry.get_db("a"),
        Err(RegistryError::UnknownPackage { .. })
    ));

    registry.scan(dir.path()).unwrap();
    registry.reset();
    assert!(registry.is_empty());
}
