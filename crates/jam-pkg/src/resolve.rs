//! Dependency resolution against a buildpack's dependency catalog.
//!
//! This module provides:
//! - Constraint expression pre-processing (`default`, `~>` and explicit ranges)
//! - Lenient version parsing for catalog entries
//! - Selection of the single best entry for an id, constraint and stack

use crate::{DependencyEntry, Metadata};
use semver::{Version, VersionReq};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during dependency resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Invalid version constraint syntax.
    #[error("invalid version constraint '{constraint}' for dependency '{id}': {reason}")]
    InvalidConstraint {
        id: String,
        constraint: String,
        reason: String,
    },

    /// A catalog entry carries a version that is not semver.
    #[error("invalid version '{version}' for dependency '{id}': {reason}")]
    InvalidVersion {
        id: String,
        version: String,
        reason: String,
    },

    /// Nothing in the catalog satisfies the request.
    #[error(
        "failed to satisfy \"{id}\" dependency version constraint \"{constraint}\": \
         no compatible versions on \"{stack}\" stack. Supported versions are: [{}]",
        .versions.join(", ")
    )]
    Unsatisfiable {
        id: String,
        constraint: String,
        stack: String,
        versions: Vec<String>,
    },

    /// More than one entry claims the wildcard stack for one version.
    #[error("multiple dependencies support wildcard stack for version: \"{version}\"")]
    AmbiguousWildcardStack { id: String, version: String },
}

/// A raw constraint expression, tagged by the rewrite it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintExpr {
    /// Empty or the literal `default`.
    Default,
    /// `~> x.y[.z]`, holding the part after the operator.
    Pessimistic(String),
    /// Any other range, used as written.
    Explicit(String),
}

impl ConstraintExpr {
    /// Classify a raw constraint expression.
    pub fn parse(expr: &str) -> Self {
        let trimmed = expr.trim();
        if trimmed.is_empty() || trimmed == "default" {
            Self::Default
        } else if let Some(rest) = trimmed.strip_prefix("~>") {
            Self::Pessimistic(rest.trim().to_string())
        } else {
            Self::Explicit(trimmed.to_string())
        }
    }

    /// Rewrite into a plain range expression.
    ///
    /// `Default` becomes the configured default version for `id`, or `*`.
    /// `Pessimistic` becomes `~x.y.z` for three components and `^x.y` or
    /// `^x` otherwise.
    #[must_use]
    pub fn normalize(&self, default_versions: &BTreeMap<String, String>, id: &str) -> String {
        match self {
            Self::Default => default_versions
                .get(id)
                .cloned()
                .unwrap_or_else(|| "*".to_string()),
            Self::Pessimistic(version) => {
                if version.split('.').count() == 3 {
                    format!("~{version}")
                } else {
                    format!("^{version}")
                }
            }
            Self::Explicit(expr) => expr.clone(),
        }
    }
}

/// A version range: one or more `||`-separated requirement sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parse a range expression.
    ///
    /// # Errors
    ///
    /// Returns the parser's message if any alternative is invalid.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let alternatives = expr
            .split("||")
            .map(|alt| {
                let comparators: Vec<String> = split_comparators(alt)
                    .iter()
                    .map(|c| normalize_comparator(c))
                    .collect();
                VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { alternatives })
    }

    /// Whether `version` satisfies any alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.alternatives.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(" || "))
    }
}

/// Break one `||` alternative into its AND-ed comparators.
///
/// Comparators may be separated by commas or whitespace, and an operator may
/// stand apart from its version. `A - B` is an inclusive range.
fn split_comparators(alternative: &str) -> Vec<String> {
    if let Some((low, high)) = alternative.split_once(" - ") {
        return vec![format!(">={}", low.trim()), format!("<={}", high.trim())];
    }

    let mut comparators = Vec::new();
    let mut operator = String::new();
    for token in alternative
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            operator.push_str(token);
        } else {
            comparators.push(format!("{operator}{token}"));
            operator.clear();
        }
    }
    if !operator.is_empty() || comparators.is_empty() {
        comparators.push(operator);
    }
    comparators
}

/// Tighten one comparator: drop the space after an operator and the `v`
/// before a version, and pin a bare version to an exact match.
fn normalize_comparator(comparator: &str) -> String {
    let comparator = comparator.trim();
    let split = comparator
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
        .unwrap_or(comparator.len());
    let (op, rest) = comparator.split_at(split);
    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix('v')
        .filter(|r| r.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(rest);

    let is_wildcard = rest.contains(['*', 'x', 'X']);
    if op.is_empty() && !is_wildcard && rest.starts_with(|c: char| c.is_ascii_digit()) {
        format!("={rest}")
    } else {
        format!("{op}{rest}")
    }
}

/// Parse a catalog version, tolerating a leading `v` and missing components.
///
/// # Errors
///
/// Returns the parser's message if the version is not semver even after
/// padding.
pub fn parse_version(version: &str) -> Result<Version, String> {
    let trimmed = version.trim().trim_start_matches('v');
    let (core, rest) = match trimmed.find(['-', '+']) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{rest}"),
        2 => format!("{core}.0{rest}"),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded).map_err(|e| e.to_string())
}

/// Select the best catalog entry for `id` on `stack`.
///
/// The highest satisfying version wins; at equal versions an entry bound to
/// explicit stacks wins over one claiming the wildcard stack.
///
/// # Errors
///
/// Returns an error if the constraint does not parse, no entry satisfies it,
/// or one version has several wildcard-stack entries.
pub fn resolve(
    catalog: &Metadata,
    id: &str,
    version: &str,
    stack: &str,
) -> Result<DependencyEntry, ResolveError> {
    let expr = ConstraintExpr::parse(version).normalize(&catalog.default_versions, id);
    let range = VersionRange::parse(&expr).map_err(|reason| ResolveError::InvalidConstraint {
        id: id.to_string(),
        constraint: version.to_string(),
        reason,
    })?;

    let mut known_versions = Vec::new();
    let mut candidates = Vec::new();
    for entry in catalog.dependencies_for(id) {
        known_versions.push(entry.version.clone());
        let parsed = parse_version(&entry.version).map_err(|reason| ResolveError::InvalidVersion {
            id: id.to_string(),
            version: entry.version.clone(),
            reason,
        })?;
        if entry.supports_stack(stack) && range.matches(&parsed) {
            candidates.push((parsed, entry));
        }
    }

    if candidates.is_empty() {
        return Err(ResolveError::Unsatisfiable {
            id: id.to_string(),
            constraint: version.to_string(),
            stack: stack.to_string(),
            versions: known_versions,
        });
    }

    check_wildcard_ambiguity(id, &candidates)?;

    candidates.sort_by(|(va, a), (vb, b)| {
        vb.cmp(va)
            .then_with(|| a.has_wildcard_stack().cmp(&b.has_wildcard_stack()))
    });

    Ok(candidates[0].1.clone())
}

/// Reject any version claimed by more than one wildcard-stack entry.
fn check_wildcard_ambiguity(
    id: &str,
    candidates: &[(Version, &DependencyEntry)],
) -> Result<(), ResolveError> {
    let mut wildcards: BTreeMap<&Version, usize> = BTreeMap::new();
    for (version, entry) in candidates {
        if entry.has_wildcard_stack() {
            *wildcards.entry(version).or_default() += 1;
        }
    }
    match wildcards.into_iter().find(|(_, count)| *count > 1) {
        Some((version, _)) => Err(ResolveError::AmbiguousWildcardStack {
            id: id.to_string(),
            version: version.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, version: &str, stacks: &[&str]) -> DependencyEntry {
        DependencyEntry {
            id: id.to_string(),
            name: format!("{id}-name"),
            version: version.to_string(),
            stacks: stacks.iter().map(|s| (*s).to_string()).collect(),
            sha256: Some(format!("{id}-{version}-sha")),
            uri: format!("https://example.com/{id}-{version}.tgz"),
            ..Default::default()
        }
    }

    fn catalog(entries: Vec<DependencyEntry>) -> Metadata {
        Metadata {
            dependencies: entries,
            ..Default::default()
        }
    }

    fn sample() -> Metadata {
        catalog(vec![
            entry("dependency-A", "1.2.2", &["stack-1"]),
            entry("dependency-A", "1.2.3", &["stack-1"]),
            entry("dependency-A", "2.3.4", &["stack-1"]),
            entry("dependency-A", "4.5.6", &["stack-2"]),
            entry("dependency-B", "9.9.9", &["stack-1"]),
        ])
    }

    #[test]
    fn test_constraint_expr_classification() {
        assert_eq!(ConstraintExpr::parse(""), ConstraintExpr::Default);
        assert_eq!(ConstraintExpr::parse("default"), ConstraintExpr::Default);
        assert_eq!(
            ConstraintExpr::parse("~> 1.2"),
            ConstraintExpr::Pessimistic("1.2".to_string())
        );
        assert_eq!(
            ConstraintExpr::parse(">= 1.0"),
            ConstraintExpr::Explicit(">= 1.0".to_string())
        );
    }

    #[test]
    fn test_pessimistic_rewrites() {
        let defaults = BTreeMap::new();
        let rewrite = |s: &str| ConstraintExpr::parse(s).normalize(&defaults, "id");
        assert_eq!(rewrite("~> 1.2.0"), "~1.2.0");
        assert_eq!(rewrite("~> 1.2"), "^1.2");
        assert_eq!(rewrite("~> 1"), "^1");
    }

    #[test]
    fn test_default_rewrites() {
        let mut defaults = BTreeMap::new();
        defaults.insert("dependency-A".to_string(), "1.2.x".to_string());
        assert_eq!(
            ConstraintExpr::Default.normalize(&defaults, "dependency-A"),
            "1.2.x"
        );
        assert_eq!(ConstraintExpr::Default.normalize(&defaults, "other"), "*");
    }

    #[test]
    fn test_parse_version_is_lenient() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_version("7").unwrap(), Version::new(7, 0, 0));
        assert_eq!(
            parse_version("1.2-rc.1").unwrap(),
            Version::parse("1.2.0-rc.1").unwrap()
        );
        assert!(parse_version("not-a-version").is_err());
    }

    #[test]
    fn test_bare_version_is_exact() {
        let range = VersionRange::parse("1.2.3").unwrap();
        assert!(range.matches(&Version::new(1, 2, 3)));
        assert!(!range.matches(&Version::new(1, 2, 4)));
    }

    #[test]
    fn test_comparator_spacing_is_tolerated() {
        let range = VersionRange::parse(">= 1.2.0, < v2.0.0").unwrap();
        assert!(range.matches(&Version::new(1, 9, 0)));
        assert!(!range.matches(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_space_separated_comparators() {
        let range = VersionRange::parse(">= 1.2.0 < 2.0.0").unwrap();
        assert!(range.matches(&Version::new(1, 2, 0)));
        assert!(range.matches(&Version::new(1, 9, 9)));
        assert!(!range.matches(&Version::new(2, 0, 0)));
        assert!(!range.matches(&Version::new(1, 1, 9)));

        let range = VersionRange::parse(">=1.2.0 <1.3.0 || 2.x").unwrap();
        assert!(range.matches(&Version::new(1, 2, 5)));
        assert!(range.matches(&Version::new(2, 4, 0)));
        assert!(!range.matches(&Version::new(1, 3, 0)));
    }

    #[test]
    fn test_hyphen_range_is_inclusive() {
        let range = VersionRange::parse("1.2.3 - 1.4.5").unwrap();
        assert!(range.matches(&Version::new(1, 2, 3)));
        assert!(range.matches(&Version::new(1, 4, 5)));
        assert!(!range.matches(&Version::new(1, 2, 2)));
        assert!(!range.matches(&Version::new(1, 4, 6)));
    }

    #[test]
    fn test_dangling_operator_is_rejected() {
        assert!(VersionRange::parse(">= 1.2.0 <").is_err());
    }

    #[test]
    fn test_version_range_alternatives() {
        let range = VersionRange::parse("1.2.* || >=3.0.0").unwrap();
        assert!(range.matches(&Version::new(1, 2, 9)));
        assert!(range.matches(&Version::new(3, 1, 0)));
        assert!(!range.matches(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_resolves_pessimistic_patch_constraint() {
        let dep = resolve(&sample(), "dependency-A", "~> 1.2.0", "stack-1").unwrap();
        assert_eq!(dep.version, "1.2.3");
    }

    #[test]
    fn test_resolves_pessimistic_minor_constraint() {
        let dep = resolve(&sample(), "dependency-A", "~> 1.2", "stack-1").unwrap();
        assert_eq!(dep.version, "1.2.3");
        let dep = resolve(&sample(), "dependency-A", "~> 2", "stack-1").unwrap();
        assert_eq!(dep.version, "2.3.4");
    }

    #[test]
    fn test_resolves_default_to_highest_on_stack() {
        let dep = resolve(&sample(), "dependency-A", "default", "stack-1").unwrap();
        assert_eq!(dep.version, "2.3.4");
        let dep = resolve(&sample(), "dependency-A", "", "stack-2").unwrap();
        assert_eq!(dep.version, "4.5.6");
    }

    #[test]
    fn test_resolves_configured_default_version() {
        let mut metadata = sample();
        metadata
            .default_versions
            .insert("dependency-A".to_string(), "1.2.x".to_string());
        let dep = resolve(&metadata, "dependency-A", "default", "stack-1").unwrap();
        assert_eq!(dep.version, "1.2.3");
    }

    #[test]
    fn test_wildcard_stack_matches_any_stack() {
        let metadata = catalog(vec![
            entry("dependency-A", "1.0.0", &["stack-1"]),
            entry("dependency-A", "1.1.0", &["*"]),
        ]);
        let dep = resolve(&metadata, "dependency-A", "1.*", "stack-9").unwrap();
        assert_eq!(dep.version, "1.1.0");
    }

    #[test]
    fn test_wildcard_entry_loses_version_tie() {
        let metadata = catalog(vec![
            entry("dependency-A", "1.2.3", &["*"]),
            entry("dependency-A", "1.2.3", &["stack-1"]),
        ]);
        let dep = resolve(&metadata, "dependency-A", "1.2.3", "stack-1").unwrap();
        assert_eq!(dep.stacks, ["stack-1"]);
    }

    #[test]
    fn test_wildcard_entry_still_wins_on_higher_version() {
        let metadata = catalog(vec![
            entry("dependency-A", "1.2.4", &["*"]),
            entry("dependency-A", "1.2.3", &["stack-1"]),
        ]);
        let dep = resolve(&metadata, "dependency-A", "1.*", "stack-1").unwrap();
        assert_eq!(dep.version, "1.2.4");
    }

    #[test]
    fn test_ambiguous_wildcard_stack_is_rejected() {
        let metadata = catalog(vec![
            entry("dependency-A", "1.2.3", &["stack-1", "*"]),
            entry("dependency-A", "1.2.3", &["stack-2", "*"]),
        ]);
        let err = resolve(&metadata, "dependency-A", "1.2.3", "stack-1").unwrap_err();
        assert_eq!(
            err,
            ResolveError::AmbiguousWildcardStack {
                id: "dependency-A".to_string(),
                version: "1.2.3".to_string(),
            }
        );
        assert!(err.to_string().contains("\"1.2.3\""));
    }

    #[test]
    fn test_unsatisfiable_lists_all_known_versions() {
        let err = resolve(&sample(), "dependency-A", "9.9.9", "stack-1").unwrap_err();
        match &err {
            ResolveError::Unsatisfiable {
                id,
                constraint,
                stack,
                versions,
            } => {
                assert_eq!(id, "dependency-A");
                assert_eq!(constraint, "9.9.9");
                assert_eq!(stack, "stack-1");
                assert_eq!(versions, &["1.2.2", "1.2.3", "2.3.4", "4.5.6"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err
            .to_string()
            .contains("Supported versions are: [1.2.2, 1.2.3, 2.3.4, 4.5.6]"));
    }

    #[test]
    fn test_unknown_stack_is_unsatisfiable() {
        let err = resolve(&sample(), "dependency-A", "*", "stack-9").unwrap_err();
        assert!(matches!(err, ResolveError::Unsatisfiable { .. }));
    }

    #[test]
    fn test_invalid_constraint_is_rejected() {
        let err = resolve(&sample(), "dependency-A", "this-is-not-semver", "stack-1").unwrap_err();
        assert!(matches!(err, ResolveError::InvalidConstraint { .. }));
    }

    #[test]
    fn test_result_always_satisfies_request() {
        let metadata = catalog(vec![
            entry("dependency-A", "1.0.0", &["stack-1"]),
            entry("dependency-A", "1.5.0", &["stack-2"]),
            entry("dependency-A", "1.4.0", &["*"]),
            entry("dependency-A", "2.0.0", &["stack-1"]),
            entry("dependency-B", "1.9.0", &["stack-1"]),
        ]);
        for (constraint, stack, want) in [
            ("1.*", "stack-1", "1.4.0"),
            ("1.*", "stack-2", "1.5.0"),
            ("*", "stack-1", "2.0.0"),
            ("< 1.2.0", "stack-1", "1.0.0"),
        ] {
            let dep = resolve(&metadata, "dependency-A", constraint, stack).unwrap();
            assert_eq!(dep.id, "dependency-A");
            assert_eq!(dep.version, want, "{constraint} on {stack}");
            assert!(dep.supports_stack(stack));
        }
    }
}
