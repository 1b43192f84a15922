//! `scoda verify`: check a container's payload checksum.

use std::path::Path;

use anyhow::{Context, Result};
use scoda_core::Container;

/// Run `scoda verify <file>`. Fails on a checksum mismatch.
pub fn run(file: &Path) -> Result<()> {
    let container =
        Container::open(file).with_context(|| format!("opening {}", file.display()))?;
    let manifest = container.manifest();

    if manifest.data_checksum_sha256.is_none() {
        println!(
            "{} v{}: no checksum recorded, nothing to verify",
            manifest.name, manifest.version
        );
        return Ok(());
    }

    container
        .ensure_verified()
        .with_context(|| format!("verifying {}", file.display()))?;
    println!("{} v{}: checksum OK", manifest.name, manifest.version);
    Ok(())
}
