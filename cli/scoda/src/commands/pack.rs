//! `scoda pack`: build a container from a SQLite database.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use scoda_core::{AssetSource, CreateOptions, Manifest, PackageMetadata};

/// Inputs for [`run`].
#[derive(Debug)]
pub struct PackArgs<'a> {
    pub db: &'a Path,
    pub output: Option<&'a Path>,
    pub metadata: Option<&'a Path>,
    pub name: Option<&'a str>,
    pub version: Option<&'a str>,
    pub assets: &'a [String],
    pub mcp_tools: Option<&'a Path>,
    pub changelog: Option<&'a Path>,
}

/// Run `scoda pack`.
pub fn run(args: &PackArgs<'_>) -> Result<Manifest> {
    let mut metadata = match args.metadata {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<PackageMetadata>(&json)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => PackageMetadata::default(),
    };
    if let Some(name) = args.name {
        metadata.name = Some(name.to_string());
    }
    if let Some(version) = args.version {
        metadata.version = Some(version.to_string());
    }

    let extra_assets = args
        .assets
        .iter()
        .map(|spec| parse_asset(spec))
        .collect::<Result<Vec<_>>>()?;

    let output = match args.output {
        Some(path) => path.to_path_buf(),
        None => args.db.with_extension("scoda"),
    };

    let options = CreateOptions {
        metadata,
        extra_assets,
        mcp_tools_path: args.mcp_tools.map(Path::to_path_buf),
        changelog_path: args.changelog.map(Path::to_path_buf),
    };
    let manifest = scoda_core::create(args.db, &output, &options)
        .with_context(|| format!("packing {}", args.db.display()))?;

    println!(
        "Packed {} v{} ({} records) -> {}",
        manifest.name,
        manifest.version,
        manifest.record_count,
        output.display()
    );
    Ok(manifest)
}

/// Parse `INTERNAL=PATH`.
fn parse_asset(spec: &str) -> Result<AssetSource> {
    match spec.split_once('=') {
        Some((internal, path)) if !internal.is_empty() && !path.is_empty() => {
            Ok(AssetSource::new(internal, PathBuf::from(path)))
        }
        _ => bail!("invalid --asset '{spec}', expected INTERNAL=PATH"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_specs() {
        let asset = parse_asset("assets/spa/index.html=dist/index.html").unwrap();
        assert_eq!(asset.archive_path, "assets/spa/index.html");
        assert_eq!(asset.source, PathBuf::from("dist/index.html"));
        assert!(parse_asset("no-equals").is_err());
        assert!(parse_asset("=path").is_err());
    }
}
