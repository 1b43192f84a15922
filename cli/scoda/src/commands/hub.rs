//! `scoda hub`: compare with and install from a static hub index.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use scoda_registry::hub::{self, DownloadStep, HubIndex};
use scoda_registry::Registry;

fn load_index(index_path: Option<&Path>) -> Result<(HubIndex, PathBuf)> {
    let Some(path) = index_path else {
        bail!(
            "no hub index configured (use --index, SCODA_HUB_INDEX or [hub] index in scoda.toml)"
        );
    };
    let index = HubIndex::load(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((index, base_dir))
}

fn scan_local(packages_dir: &Path) -> Result<Registry> {
    let mut registry = Registry::new();
    if packages_dir.is_dir() {
        registry
            .scan(packages_dir)
            .with_context(|| format!("scanning {}", packages_dir.display()))?;
    }
    Ok(registry)
}

/// Run `scoda hub status`.
pub fn status(index_path: Option<&Path>, packages_dir: &Path, json: bool) -> Result<()> {
    let (index, _) = load_index(index_path)?;
    let registry = scan_local(packages_dir)?;
    let result = hub::compare_with_local(&index, &registry.local_versions());

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Available ({}):", result.available.len());
    for row in &result.available {
        match row.size_bytes {
            Some(size) => println!("  {} v{} ({size} bytes)", row.name, row.hub_version),
            None => println!("  {} v{}", row.name, row.hub_version),
        }
    }
    println!("Updatable ({}):", result.updatable.len());
    for row in &result.updatable {
        let local = row.local_version.as_deref().unwrap_or("?");
        println!("  {} v{local} -> v{}", row.name, row.hub_version);
    }
    println!("Up to date ({}):", result.up_to_date.len());
    for row in &result.up_to_date {
        println!("  {} v{}", row.name, row.local_version.as_deref().unwrap_or("?"));
    }
    Ok(())
}

/// Run `scoda hub order <name>`.
pub fn order(
    index_path: Option<&Path>,
    packages_dir: &Path,
    name: &str,
) -> Result<Vec<DownloadStep>> {
    let (index, _) = load_index(index_path)?;
    let registry = scan_local(packages_dir)?;
    if !index.packages.contains_key(name) {
        bail!("package '{name}' is not in the hub index");
    }

    let steps = hub::resolve_download_order(&index, name, &registry.local_versions());
    if steps.is_empty() {
        println!("{name} is up to date");
    }
    for (i, step) in steps.iter().enumerate() {
        println!("  {}. {} v{}", i + 1, step.name, step.version);
    }
    Ok(steps)
}

/// Run `scoda hub install <name>`. Returns the installed files.
pub fn install(
    index_path: Option<&Path>,
    packages_dir: &Path,
    name: &str,
) -> Result<Vec<PathBuf>> {
    let (index, base_dir) = load_index(index_path)?;
    let registry = scan_local(packages_dir)?;
    if !index.packages.contains_key(name) {
        bail!("package '{name}' is not in the hub index");
    }

    let steps = hub::resolve_download_order(&index, name, &registry.local_versions());
    drop(registry);

    let mut installed = Vec::with_capacity(steps.len());
    for step in &steps {
        let Some(url) = step.entry.download_url.as_deref().filter(|u| !u.is_empty()) else {
            bail!("{} v{} has no download_url", step.name, step.version);
        };
        let source = hub::local_source(&base_dir, url)?;
        let mut reader =
            File::open(&source).with_context(|| format!("opening {}", source.display()))?;
        let file_name = hub::download_file_name(url, &step.name);

        let dest = hub::install(
            &mut reader,
            packages_dir,
            &file_name,
            step.entry.sha256.as_deref(),
            |_| {},
        )
        .with_context(|| format!("installing {} v{}", step.name, step.version))?;
        println!("Installed {} v{} -> {}", step.name, step.version, dest.display());
        installed.push(dest);
    }

    if installed.is_empty() {
        println!("{name} is up to date");
    }
    Ok(installed)
}
