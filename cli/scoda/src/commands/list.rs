//! `scoda list`: list the packages in a directory.

use std::path::Path;

use anyhow::{Context, Result};
use scoda_registry::Registry;

/// Run `scoda list`.
pub fn run(packages_dir: &Path, json: bool) -> Result<()> {
    let mut registry = Registry::new();
    registry
        .scan(packages_dir)
        .with_context(|| format!("scanning {}", packages_dir.display()))?;
    let packages = registry.list_packages();

    if json {
        println!("{}", serde_json::to_string_pretty(&packages)?);
        return Ok(());
    }

    if packages.is_empty() {
        println!("No packages in {}", packages_dir.display());
        return Ok(());
    }

    println!("{} package(s) in {}:", packages.len(), packages_dir.display());
    for p in &packages {
        println!("  {} v{} - {} ({} records)", p.name, p.version, p.title, p.record_count);
        for dep in &p.deps {
            println!("      depends on {} as {}", dep.name, dep.alias);
        }
    }
    registry.close_all();
    Ok(())
}
