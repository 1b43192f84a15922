//! Dotted version parsing and constraint matching.
//!
//! Package versions are looser than strict semver: `"3"`, `"1.2"` and
//! `"1.2.3-alpha"` are all accepted. Missing components default to zero and
//! any pre-release or build suffix is dropped, so ordering is decided by the
//! `(major, minor, patch)` triple alone. The parsed form is a plain
//! [`semver::Version`] with empty pre-release and build metadata.
//!
//! Constraints are comma-separated clauses that must all hold:
//!
//! ```text
//! >=0.1.1,<0.2.0
//! ==1.0.0
//! 1.0.0          (bare version means ==)
//! !=2.0
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ScodaError};

/// A parsed package version.
pub type Version = semver::Version;

/// Parse a version string like `"1.2.3"`, `"1.2"`, `"3"` or `"1.2.3-rc1"`.
pub fn parse_version(input: &str) -> Result<Version> {
    let invalid = |reason: &str| ScodaError::InvalidVersion {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty version"));
    }

    let core = trimmed
        .split_once(|c: char| c == '-' || c == '+')
        .map_or(trimmed, |(core, _suffix)| core);

    let mut parts = [0u64; 3];
    let mut count = 0;
    for segment in core.split('.') {
        if count == parts.len() {
            return Err(invalid("more than three components"));
        }
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("components must be non-negative integers"));
        }
        parts[count] = segment
            .parse()
            .map_err(|_| invalid("component out of range"))?;
        count += 1;
    }

    Ok(Version::new(parts[0], parts[1], parts[2]))
}

/// Parse an optional version, treating absence as an error.
pub fn parse_optional_version(input: Option<&str>) -> Result<Version> {
    match input {
        Some(s) => parse_version(s),
        None => Err(ScodaError::InvalidVersion {
            input: String::new(),
            reason: "no version given".to_string(),
        }),
    }
}

/// Compare two version strings.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    Ok(parse_version(a)?.cmp(&parse_version(b)?))
}

/// A comparison operator in a constraint clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Lt => "<",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
            Op::Ge => ordering != Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
            Op::Gt => ordering == Ordering::Greater,
            Op::Lt => ordering == Ordering::Less,
        }
    }
}

/// One `<op><version>` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub op: Op,
    pub version: Version,
}

impl Clause {
    pub fn matches(&self, version: &Version) -> bool {
        self.op.holds(version.cmp(&self.version))
    }
}

/// A conjunction of clauses. An empty constraint accepts every version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraint {
    clauses: Vec<Clause>,
}

impl Constraint {
    /// The constraint that accepts everything.
    pub fn any() -> Self {
        Constraint::default()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_any(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.clauses.iter().all(|c| c.matches(version))
    }
}

impl FromStr for Constraint {
    type Err = ScodaError;

    fn from_str(s: &str) -> Result<Self> {
        // Two-character operators first so ">=" is not read as ">".
        const OPS: [(&str, Op); 6] = [
            ("==", Op::Eq),
            ("!=", Op::Ne),
            (">=", Op::Ge),
            ("<=", Op::Le),
            (">", Op::Gt),
            ("<", Op::Lt),
        ];

        let mut clauses = Vec::new();
        for raw in s.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (op, rest) = OPS
                .iter()
                .find_map(|(sym, op)| raw.strip_prefix(*sym).map(|rest| (*op, rest)))
                .unwrap_or((Op::Eq, raw));
            clauses.push(Clause {
                op,
                version: parse_version(rest)?,
            });
        }
        Ok(Constraint { clauses })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .clauses
            .iter()
            .map(|c| format!("{}{}", c.op.symbol(), c.version))
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// Check whether `version` satisfies `constraint`.
///
/// An empty constraint is always satisfied. If either the version or any
/// clause fails to parse the answer is `false`: an unreadable version is a
/// non-match, never an error.
pub fn satisfies(version: &str, constraint: &str) -> bool {
    if constraint.trim().is_empty() {
        return true;
    }
    let Ok(version) = parse_version(version) else {
        return false;
    };
    match constraint.parse::<Constraint>() {
        Ok(constraint) => constraint.matches(&version),
        Err(_) => false,
    }
}
