//! Buildpack manifest (`buildpack.toml`) parsing and encoding.

use crate::Checksum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// The manifest filename.
pub const MANIFEST_FILE: &str = "buildpack.toml";

/// Stack id that declares compatibility with every stack.
pub const WILDCARD_STACK: &str = "*";

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode manifest: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// The complete buildpack.toml manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Buildpack API version.
    #[serde(default)]
    pub api: String,

    /// Buildpack identity.
    #[serde(default)]
    pub buildpack: BuildpackInfo,

    /// Stacks the buildpack runs on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacks: Vec<Stack>,

    /// Group ordering for meta buildpacks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<Order>,

    /// Packaging and dependency metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

/// The `[buildpack]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildpackInfo {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, rename = "clear-env", skip_serializing_if = "std::ops::Not::not")]
    pub clear_env: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<BuildpackLicense>,

    #[serde(default, rename = "sbom-formats", skip_serializing_if = "Vec::is_empty")]
    pub sbom_formats: Vec<String>,
}

/// A license declared for the buildpack itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildpackLicense {
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
}

/// A `[[stacks]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<String>,
}

/// An `[[order]]` entry of a meta buildpack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub group: Vec<OrderEntry>,
}

/// One buildpack reference inside an order group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

/// The `[metadata]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Archive members, relative to the buildpack root.
    #[serde(default, rename = "include-files", skip_serializing_if = "Vec::is_empty")]
    pub include_files: Vec<String>,

    /// Shell script run against the scratch copy before bundling.
    #[serde(default, rename = "pre-package", skip_serializing_if = "String::is_empty")]
    pub pre_package: String,

    /// Version used when a dependency is requested as `default`.
    #[serde(default, rename = "default-versions", skip_serializing_if = "BTreeMap::is_empty")]
    pub default_versions: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyEntry>,

    #[serde(
        default,
        rename = "dependency-constraints",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dependency_constraints: Vec<DependencyConstraint>,

    /// Keys this crate does not interpret, carried through unchanged.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

/// A published dependency payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub stacks: Vec<String>,

    /// Qualified checksum (`algorithm:hash`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Legacy bare sha256 digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    pub uri: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    #[serde(default, rename = "source-checksum", skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<String>,

    /// Legacy bare sha256 digest of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,

    #[serde(
        default,
        with = "deprecation_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub deprecation_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpe: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purl: String,
}

impl DependencyEntry {
    /// The payload checksum, preferring `checksum` over the legacy `sha256`.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        match (&self.checksum, &self.sha256) {
            (Some(checksum), _) => Checksum::parse(checksum),
            (None, Some(sha256)) => Checksum::new(crate::checksum::DEFAULT_ALGORITHM, sha256),
            (None, None) => Checksum::new("", ""),
        }
    }

    /// Whether the entry runs on `stack`, directly or through the wildcard.
    #[must_use]
    pub fn supports_stack(&self, stack: &str) -> bool {
        self.stacks.iter().any(|s| s == stack || s == WILDCARD_STACK)
    }

    /// Whether the entry claims the wildcard stack.
    #[must_use]
    pub fn has_wildcard_stack(&self) -> bool {
        self.stacks.iter().any(|s| s == WILDCARD_STACK)
    }
}

/// A `[[metadata.dependency-constraints]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyConstraint {
    pub id: String,

    pub constraint: String,

    /// How many of the highest matching versions to keep.
    #[serde(default)]
    pub patches: usize,
}

impl Manifest {
    /// Load a manifest from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize the manifest to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ManifestError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the manifest to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

impl Metadata {
    /// Drop dependencies that cannot run on `stack`.
    pub fn retain_stack(&mut self, stack: &str) {
        self.dependencies.retain(|dep| dep.supports_stack(stack));
    }

    /// All dependencies declared with the given id.
    pub fn dependencies_for<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a DependencyEntry> {
        self.dependencies.iter().filter(move |dep| dep.id == id)
    }
}

/// Accepts both quoted RFC 3339 strings and native TOML datetimes.
mod deprecation_date {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = match toml::Value::deserialize(deserializer)? {
            toml::Value::String(s) => s,
            toml::Value::Datetime(d) => d.to_string(),
            other => {
                return Err(D::Error::custom(format!(
                    "invalid deprecation_date '{other}'"
                )))
            }
        };
        DateTime::parse_from_rfc3339(&raw)
            .map(|date| Some(date.with_timezone(&Utc)))
            .map_err(D::Error::custom)
    }
}
