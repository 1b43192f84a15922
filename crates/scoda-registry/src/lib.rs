//! Package catalog and dependency resolution for `.scoda` packages.
//!
//! A [`Registry`] discovers containers in a directory, keeps each one open,
//! and hands out SQLite connections in which a package's declared
//! dependencies are attached under their aliases. Dependencies are attached
//! one level deep only. Every package also gets a writable overlay
//! database, attached as `overlay`, for user annotations and preferences.
//!
//! The [`hub`] module compares a static hub index with the local catalog and
//! installs downloads with checksum verification.

pub mod error;
pub mod hub;
pub mod overlay;
pub mod registry;
pub mod resolution;

// Re-exports for convenience.
pub use error::{RegistryError, Result};
pub use hub::{compare_with_local, resolve_download_order, HubComparison, HubIndex};
pub use overlay::{Annotation, NewAnnotation, OVERLAY_ALIAS};
pub use registry::{DependencySummary, PackageSummary, Registry};
pub use resolution::Attachment;
