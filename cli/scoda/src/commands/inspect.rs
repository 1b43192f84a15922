//! `scoda inspect`: show a container's manifest and contents.

use std::path::Path;

use anyhow::{Context, Result};
use scoda_core::ScodaPackage;

/// Run `scoda inspect <file>`.
pub fn run(file: &Path, json: bool, verify: bool) -> Result<()> {
    let mut package = ScodaPackage::open_with(file, verify)
        .with_context(|| format!("opening {}", file.display()))?;

    let manifest = package.manifest()?;
    if json {
        println!("{}", manifest.to_json_pretty()?);
        package.close();
        return Ok(());
    }

    println!("{} v{}", manifest.name, manifest.version);
    println!("  Title:       {}", manifest.display_title());
    if let Some(description) = &manifest.description {
        println!("  Description: {description}");
    }
    if let Some(license) = &manifest.license {
        println!("  License:     {license}");
    }
    if let Some(created_at) = &manifest.created_at {
        println!("  Created:     {created_at}");
    }
    println!("  Format:      {} {}", manifest.format, manifest.format_version);
    println!("  Records:     {}", manifest.record_count);
    match &manifest.data_checksum_sha256 {
        Some(sum) => println!("  SHA-256:     {sum}"),
        None => println!("  SHA-256:     (none)"),
    }

    if manifest.dependencies.is_empty() {
        println!("  Dependencies: none");
    } else {
        println!("  Dependencies:");
        for dep in &manifest.dependencies {
            let constraint = if dep.version_constraint.is_empty() {
                "any"
            } else {
                dep.version_constraint.as_str()
            };
            let kind = if dep.required { "required" } else { "optional" };
            println!("    {} as {} ({constraint}, {kind})", dep.name, dep.alias());
        }
    }

    let tools = package
        .mcp_tools()?
        .and_then(|v| v.get("tools"))
        .and_then(|t| t.as_array())
        .map_or(0, Vec::len);
    if package.mcp_tools()?.is_some() {
        println!("  MCP tools:   {tools}");
    }
    if package.has_reference_spa()? {
        println!("  Reference SPA bundled");
    }

    println!("  Entries:");
    for name in package.asset_names()? {
        println!("    {name}");
    }

    package.close();
    Ok(())
}
