//! `scoda resolve`: resolve a package's dependencies and show the result.

use std::path::Path;

use anyhow::{Context, Result};
use scoda_registry::Registry;

/// Run `scoda resolve <name>`. Returns the attached schema names.
pub fn run(packages_dir: &Path, name: &str) -> Result<Vec<String>> {
    let mut registry = Registry::new();
    registry
        .scan(packages_dir)
        .with_context(|| format!("scanning {}", packages_dir.display()))?;

    let conn = registry
        .get_db(name)
        .with_context(|| format!("resolving {name}"))?;

    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let schemas = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    println!("{name}: {} database(s) attached", schemas.len());
    for (schema, file) in &schemas {
        println!("  {schema:<12} {file}");
    }
    if let Some(attachments) = registry.resolved_aliases(name) {
        for a in attachments {
            println!("  {} -> {} v{}", a.alias, a.name, a.version);
        }
    }

    let names = schemas.into_iter().map(|(schema, _)| schema).collect();
    registry.close_all();
    Ok(names)
}
