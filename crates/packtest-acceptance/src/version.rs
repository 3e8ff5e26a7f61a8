//! Runtime-version applicability of test cases.
//!
//! A constraint is a range expression such as `">= 12.0.0"`. Comparators
//! separated by commas or whitespace must all hold; `||` separates
//! alternatives of which one must hold. An operator may be separated from
//! its version by spaces, versions may be partial (`12`, `12.1`) or carry a
//! `v` prefix, and a bare version means an exact match.

use packtest_common::error::{PacktestError, Result};
use semver::{Version, VersionReq};

const OPERATOR_CHARS: &[char] = &['=', '<', '>', '~', '^'];

/// A parsed range expression: any alternative may match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    alternatives: Vec<VersionReq>,
}

impl Constraint {
    /// Parses a non-empty range expression.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the expression is empty or invalid.
    pub fn parse(expression: &str) -> Result<Self> {
        let alternatives = expression
            .split("||")
            .map(|alternative| parse_alternative(alternative, expression))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { alternatives })
    }

    /// Returns whether `version` satisfies any alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Parses a possibly partial or `v`-prefixed runtime version.
///
/// Missing minor and patch components are filled with zeros, so `20`
/// becomes `20.0.0`.
///
/// # Errors
///
/// Returns a setup error if the version is not valid.
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = strip_v(raw.trim());
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let components = core.split('.').count();
    let padded = match components {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded)
        .map_err(|e| PacktestError::setup(format!("invalid runtime version \"{raw}\": {e}")))
}

/// Returns whether a case gated by `constraint` applies to `version`.
///
/// An empty constraint applies to every version.
///
/// # Errors
///
/// Returns a setup error if the constraint or the version is invalid.
pub fn should_test(version: &str, constraint: &str) -> Result<bool> {
    if constraint.trim().is_empty() {
        return Ok(true);
    }
    let constraint = Constraint::parse(constraint)?;
    let version = parse_version(version)?;
    Ok(constraint.matches(&version))
}

/// Version filter for one run, holding the runtime version under test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilter {
    runtime: Option<Version>,
}

impl VersionFilter {
    /// Creates a filter for the given runtime version.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the version is invalid.
    pub fn new(runtime_version: Option<&str>) -> Result<Self> {
        let runtime = runtime_version
            .filter(|v| !v.trim().is_empty())
            .map(parse_version)
            .transpose()?;
        Ok(Self { runtime })
    }

    /// Creates a filter that tests every case.
    #[must_use]
    pub const fn unfiltered() -> Self {
        Self { runtime: None }
    }

    /// Returns the runtime version under test, if any.
    #[must_use]
    pub const fn runtime_version(&self) -> Option<&Version> {
        self.runtime.as_ref()
    }

    /// Returns whether a case gated by `constraint` should run.
    ///
    /// Constraints are validated even when no runtime version is set, in
    /// which case every case runs.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the constraint is invalid.
    pub fn should_test(&self, constraint: &str) -> Result<bool> {
        if constraint.trim().is_empty() {
            return Ok(true);
        }
        let parsed = Constraint::parse(constraint)?;
        Ok(self.runtime.as_ref().is_none_or(|v| parsed.matches(v)))
    }
}

fn parse_alternative(alternative: &str, expression: &str) -> Result<VersionReq> {
    let invalid = |detail: String| {
        PacktestError::setup(format!(
            "invalid version constraint \"{expression}\": {detail}"
        ))
    };

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in alternative
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            if pending_op.is_some() {
                return Err(invalid(format!("operator \"{token}\" follows another operator")));
            }
            pending_op = Some(token);
            continue;
        }
        let (op, version) = match pending_op.take() {
            Some(op) => (op, token),
            None => {
                let split = token
                    .find(|c: char| !OPERATOR_CHARS.contains(&c))
                    .unwrap_or(token.len());
                token.split_at(split)
            }
        };
        comparators.push(comparator(op, strip_v(version)));
    }

    if let Some(op) = pending_op {
        return Err(invalid(format!("operator \"{op}\" has no version")));
    }
    if comparators.is_empty() {
        return Err(invalid("empty alternative".into()));
    }

    VersionReq::parse(&comparators.join(", ")).map_err(|e| invalid(e.to_string()))
}

fn comparator(op: &str, version: &str) -> String {
    let wildcard = version == "*"
        || version
            .split('.')
            .any(|part| part.eq_ignore_ascii_case("x") || part == "*");
    if op.is_empty() && !wildcard {
        format!("={version}")
    } else {
        format!("{op}{version}")
    }
}

fn strip_v(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}
