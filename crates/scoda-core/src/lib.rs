//! The `.scoda` data package format.
//!
//! A `.scoda` file is a ZIP container wrapping one SQLite database together
//! with a JSON manifest (identity, version, record count, payload checksum,
//! declared dependencies) and optional assets such as a bundled web viewer,
//! tool definitions and a changelog.
//!
//! # Layers
//!
//! - [`container`] builds and reads archives and verifies payloads
//! - [`package`] opens a container into a usable handle backed by a
//!   temporary extraction directory
//! - [`version`] parses loose dotted versions and evaluates constraints
//! - [`integrity`] computes SHA-256 digests shared with the hub index

pub mod container;
pub mod error;
pub mod integrity;
pub mod manifest;
pub mod package;
pub mod version;

#[cfg(test)]
mod testutil;

// Re-exports for convenience.
pub use container::{create, verify, AssetSource, Assets, Container, CreateOptions, PackageMetadata};
pub use error::{Result, ScodaError};
pub use integrity::ContentHash;
pub use manifest::{Dependency, Manifest};
pub use package::ScodaPackage;
pub use version::{compare_versions, parse_version, satisfies, Constraint, Version};
