//! Remote dependency catalog client.
//!
//! This module provides functionality to:
//! - Query a dependency catalog service for every published version of an id
//! - Narrow those versions to a constraint, keeping only the newest patches
//! - Map catalog records into manifest dependency entries

use crate::resolve::{parse_version, VersionRange};
use crate::transport::{ClientConfig, TransportError};
use crate::{DependencyConstraint, DependencyEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catalog queried when no API is given.
pub const DEFAULT_API: &str = "https://api.deps.paketo.io";

/// Errors that can occur during catalog operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The request could not be made.
    #[error("failed to query url {url}: {reason}")]
    Network { url: String, reason: String },

    /// The catalog answered with a non-200 status.
    #[error("failed to query url {url} with: status code {status}")]
    Status { url: String, status: u16 },

    /// The catalog answered with something other than a record list.
    #[error("failed to parse response from {url}: {reason}")]
    Json { url: String, reason: String },

    /// The constraint expression does not parse.
    #[error("invalid constraint '{constraint}' for dependency '{id}': {reason}")]
    InvalidConstraint {
        id: String,
        constraint: String,
        reason: String,
    },

    /// A catalog record carries a version that is not semver.
    #[error("invalid version '{version}' for dependency '{id}': {reason}")]
    InvalidVersion {
        id: String,
        version: String,
        reason: String,
    },

    /// The HTTP client could not be created.
    #[error(transparent)]
    Client(#[from] TransportError),
}

/// A stack reference inside a catalog record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogStack {
    pub id: String,
}

/// One published dependency version as reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Dependency id.
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub stacks: Vec<CatalogStack>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_sha256: String,
    #[serde(default)]
    pub cpe: String,
    #[serde(default)]
    pub purl: String,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub deprecation_date: Option<DateTime<Utc>>,
}

impl CatalogRecord {
    /// Map into a manifest entry named `name`.
    #[must_use]
    pub fn into_dependency(self, name: &str) -> DependencyEntry {
        let qualify = |hash: String| (!hash.is_empty()).then(|| format!("sha256:{hash}"));
        DependencyEntry {
            id: self.name,
            name: name.to_string(),
            version: self.version.trim_start_matches('v').to_string(),
            stacks: self.stacks.into_iter().map(|s| s.id).collect(),
            checksum: qualify(self.sha256),
            sha256: None,
            uri: self.uri,
            source: self.source,
            source_checksum: qualify(self.source_sha256),
            source_sha256: None,
            deprecation_date: self.deprecation_date,
            licenses: self.licenses,
            cpe: self.cpe,
            purl: self.purl,
        }
    }
}

/// Client for the dependency catalog service.
pub struct CatalogClient {
    api: String,
    http_client: reqwest::blocking::Client,
}

impl CatalogClient {
    /// Create a client for `api` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api: impl Into<String>) -> Result<Self, CatalogError> {
        Self::with_config(api, &ClientConfig::default())
    }

    /// Create a client for `api` with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(api: impl Into<String>, config: &ClientConfig) -> Result<Self, CatalogError> {
        Ok(Self {
            api: api.into().trim_end_matches('/').to_string(),
            http_client: config.build_client()?,
        })
    }

    /// The URL queried for `id`.
    #[must_use]
    pub fn query_url(&self, id: &str) -> String {
        format!("{}/v1/dependency?name={id}", self.api)
    }

    /// Fetch every published record for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a non-200 status, or a body that
    /// is not a JSON record list.
    pub fn fetch_all(&self, id: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
        let url = self.query_url(id);
        tracing::debug!("GET {url}");

        let response = self
            .http_client
            .get(&url)
            .send()
            .map_err(|e| CatalogError::Network {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(CatalogError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let body = response.text().map_err(|e| CatalogError::Network {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&body).map_err(|e| CatalogError::Json {
            url,
            reason: e.to_string(),
        })
    }
}

/// Narrow catalog records to the newest `patches` versions within a constraint.
///
/// Records are matched on `constraint.id`, sorted ascending by version, and
/// the highest `constraint.patches` are kept in ascending order. Fewer
/// matches than requested is not an error.
///
/// # Errors
///
/// Returns an error if the constraint or a matching record's version does
/// not parse.
pub fn dependencies_within_constraint(
    records: &[CatalogRecord],
    constraint: &DependencyConstraint,
    name: &str,
) -> Result<Vec<DependencyEntry>, CatalogError> {
    let range =
        VersionRange::parse(&constraint.constraint).map_err(|reason| CatalogError::InvalidConstraint {
            id: constraint.id.clone(),
            constraint: constraint.constraint.clone(),
            reason,
        })?;

    let mut matching = Vec::new();
    for record in records.iter().filter(|r| r.name == constraint.id) {
        let version = parse_version(&record.version).map_err(|reason| CatalogError::InvalidVersion {
            id: record.name.clone(),
            version: record.version.clone(),
            reason,
        })?;
        if range.matches(&version) {
            matching.push((version, record));
        }
    }

    tracing::debug!(
        "{} version(s) of {} satisfy {range}",
        matching.len(),
        constraint.id
    );
    matching.sort_by(|(a, _), (b, _)| a.cmp(b));
    let skip = matching.len().saturating_sub(constraint.patches);

    Ok(matching
        .into_iter()
        .skip(skip)
        .map(|(_, record)| record.clone().into_dependency(name))
        .collect())
}
