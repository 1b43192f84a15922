//! Dependency resolution.
//!
//! Turns a package's declared dependencies into the list of databases to
//! ATTACH beside it. Resolution is one level deep: a dependency's own
//! dependencies are never consulted, so cycles in the declared graph are
//! harmless.
//!
//! Policy, per dependency in declaration order:
//!
//! | condition                         | required | optional |
//! |-----------------------------------|----------|----------|
//! | name not in catalog               | error    | skip     |
//! | version fails the constraint      | error    | skip     |
//! | present and satisfied             | attach   | attach   |
//!
//! Alias problems (empty, reserved name, duplicate) are errors
//! regardless of `required`, and are checked before anything is attached.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use scoda_core::version;
use scoda_core::Dependency;
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};
use crate::overlay::OVERLAY_ALIAS;

/// Schema names a dependency may never use.
pub const RESERVED_ALIASES: [&str; 3] = ["main", "temp", OVERLAY_ALIAS];

/// What the catalog knows about a candidate dependency.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub version: &'a str,
    pub path: &'a Path,
}

/// A dependency that resolved and should be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub alias: String,
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

/// Check an alias against the reserved schema names.
///
/// Any other non-empty name is accepted; it is quoted when attached.
pub fn validate_alias(alias: &str) -> std::result::Result<(), String> {
    if alias.is_empty() {
        return Err("dependency alias is empty".to_string());
    }
    if RESERVED_ALIASES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(alias))
    {
        return Err(format!("alias '{alias}' is reserved"));
    }
    Ok(())
}

/// Plan the attachments for `package`.
///
/// `lookup` answers catalog queries by package name.
pub fn plan_attachments<'a, F>(
    package: &str,
    dependencies: &[Dependency],
    lookup: F,
) -> Result<Vec<Attachment>>
where
    F: Fn(&str) -> Option<Candidate<'a>>,
{
    let mut seen = HashSet::new();
    for dep in dependencies {
        let alias = dep.alias();
        validate_alias(alias).map_err(|detail| RegistryError::dependency(package, detail))?;
        if !seen.insert(alias.to_ascii_lowercase()) {
            return Err(RegistryError::dependency(
                package,
                format!("alias '{alias}' is declared by more than one dependency"),
            ));
        }
    }

    let mut plan = Vec::with_capacity(dependencies.len());
    for dep in dependencies {
        let Some(candidate) = lookup(&dep.name) else {
            if dep.required {
                return Err(RegistryError::dependency(
                    package,
                    format!("required dependency '{}' is not installed", dep.name),
                ));
            }
            warn!("{package}: optional dependency '{}' not installed, skipping", dep.name);
            continue;
        };

        if !version::satisfies(candidate.version, &dep.version_constraint) {
            if dep.required {
                return Err(RegistryError::dependency(
                    package,
                    format!(
                        "'{}' {} does not satisfy '{}'",
                        dep.name, candidate.version, dep.version_constraint
                    ),
                ));
            }
            warn!(
                "{package}: optional dependency '{}' {} does not satisfy '{}', skipping",
                dep.name, candidate.version, dep.version_constraint
            );
            continue;
        }

        debug!("{package}: {} {} as {}", dep.name, candidate.version, dep.alias());
        plan.push(Attachment {
            alias: dep.alias().to_string(),
            name: dep.name.clone(),
            version: candidate.version.to_string(),
            path: candidate.path.to_path_buf(),
        });
    }
    Ok(plan)
}
