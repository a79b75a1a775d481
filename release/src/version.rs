//! Lenient version parsing and constraint matching.
//!
//! Release versions in the wild are not always three-part semver: BOSH
//! stemcells use `621.55`, some releases use a bare `190`. Those are padded
//! with zeros before comparison. Constraints accept the usual operators
//! (`~`, `^`, `>=`, `<`, ...), space- or comma-separated conjunctions, and
//! `||` alternatives.

use crate::error::{ReleaseError, Result};
use semver::{Version, VersionReq};

/// Parse `raw` as a version, padding missing minor/patch components and
/// tolerating a leading `v` and leading zeros.
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let suffix_start = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(suffix_start);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }

    let [major, minor, patch] = numbers;
    Version::parse(&format!("{major}.{minor}.{patch}{suffix}")).ok()
}

/// A parsed version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Empty constraint, `*`, or `latest`.
    Any,
    /// A plain version with no operator.
    Exact(String),
    /// One or more `||` alternatives.
    Range(Vec<VersionReq>),
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::Any);
        }
        if !looks_like_range(trimmed) && parse_lenient(trimmed).is_some() {
            return Ok(Self::Exact(trimmed.to_string()));
        }

        let mut alternatives = Vec::new();
        for alternative in trimmed.split("||") {
            let normalized = normalize_conjunction(alternative);
            let req = VersionReq::parse(&normalized).map_err(|e| ReleaseError::InvalidConstraint {
                constraint: raw.to_string(),
                message: e.to_string(),
            })?;
            alternatives.push(req);
        }
        Ok(Self::Range(alternatives))
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// Whether `version` satisfies this constraint. Versions that cannot be
    /// parsed only ever satisfy [`VersionConstraint::Any`] or an identical
    /// exact string.
    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => {
                expected == version
                    || matches!(
                        (parse_lenient(expected), parse_lenient(version)),
                        (Some(a), Some(b)) if a == b
                    )
            }
            Self::Range(alternatives) => match parse_lenient(version) {
                Some(parsed) => alternatives.iter().any(|req| req.matches(&parsed)),
                None => false,
            },
        }
    }
}

/// Pick the highest candidate whose version satisfies `constraint`.
///
/// Candidates whose version does not parse are skipped. On equal versions the
/// earliest candidate wins.
pub fn select_highest<T>(
    constraint: &VersionConstraint,
    candidates: impl IntoIterator<Item = (String, T)>,
) -> Option<(String, T)> {
    let mut best: Option<(Version, String, T)> = None;
    for (raw, item) in candidates {
        let Some(parsed) = parse_lenient(&raw) else {
            tracing::debug!(version = %raw, "skipping unparseable version");
            continue;
        };
        if !constraint.matches(&raw) {
            continue;
        }
        let newer = best.as_ref().is_none_or(|(current, _, _)| parsed > *current);
        if newer {
            best = Some((parsed, raw, item));
        }
    }
    best.map(|(_, raw, item)| (raw, item))
}

/// Operators, `||`, conjunctions, or a wildcard component in the numeric
/// part (`1.x`, `1.*`). Letters after `-` or `+` are pre-release or build
/// metadata and say nothing about ranges.
fn looks_like_range(raw: &str) -> bool {
    if raw.starts_with(|c: char| "~^=<>!*".contains(c))
        || raw.contains("||")
        || raw.contains([' ', '\t', ','])
    {
        return true;
    }
    let core = raw.split(['-', '+']).next().unwrap_or(raw);
    core.split('.')
        .any(|part| matches!(part, "x" | "X" | "*"))
}

/// `">= 1.0 < 2"` -> `">=1.0, <2"`, the form `semver::VersionReq` accepts.
fn normalize_conjunction(raw: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_operator = String::new();
    for token in raw.split([',', ' ', '\t']).filter(|t| !t.is_empty()) {
        if token.chars().all(|c| "~^=<>!".contains(c)) {
            pending_operator.push_str(token);
            continue;
        }
        comparators.push(format!("{}{}", std::mem::take(&mut pending_operator), token));
    }
    comparators.join(", ")
}
