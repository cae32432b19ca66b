//! Offline caching of dependency payloads.

use crate::transport::{Transport, TransportError, FILE_SCHEME};
use crate::validate::{is_checksum_mismatch, ValidatedReader};
use crate::DependencyEntry;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory, relative to the buildpack root, holding cached payloads.
pub const DEPENDENCIES_DIR: &str = "dependencies";

/// Errors that can occur while caching dependencies.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache directory or a cache file could not be created.
    #[error("failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The declared checksum cannot name a cache file.
    #[error("failed to cache dependency '{id}' {version}: checksum hash \"{hash}\" is not a hex digest")]
    InvalidHash {
        id: String,
        version: String,
        hash: String,
    },

    /// The payload could not be opened.
    #[error("failed to fetch dependency '{id}' {version}: {source}")]
    Fetch {
        id: String,
        version: String,
        #[source]
        source: TransportError,
    },

    /// The payload did not hash to its declared checksum.
    #[error("failed to cache dependency '{id}' {version}: {source}")]
    ChecksumMismatch {
        id: String,
        version: String,
        #[source]
        source: io::Error,
    },

    /// Streaming the payload to disk failed.
    #[error("failed to copy dependency '{id}' {version}: {source}")]
    Copy {
        id: String,
        version: String,
        #[source]
        source: io::Error,
    },
}

/// The archive-relative path of a cached payload.
#[must_use]
pub fn cache_member(dep: &DependencyEntry) -> String {
    format!("{DEPENDENCIES_DIR}/{}", dep.checksum().hash())
}

/// Downloads, validates and stores every dependency under the buildpack root.
pub struct DependencyCacher<T> {
    transport: T,
}

impl<T: Transport> DependencyCacher<T> {
    /// Create a cacher that fetches through `transport`.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Cache `deps` under `root/dependencies/` and point their URIs there.
    ///
    /// Dependencies are processed in order and the first failure aborts the
    /// run. Files cached before the failure stay on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload cannot be fetched, does not match its
    /// checksum, or cannot be written.
    pub fn cache(
        &self,
        root: &Path,
        deps: Vec<DependencyEntry>,
    ) -> Result<Vec<DependencyEntry>, CacheError> {
        let dir = root.join(DEPENDENCIES_DIR);
        fs::create_dir_all(&dir).map_err(|source| CacheError::Create {
            path: dir.clone(),
            source,
        })?;

        let mut cached = Vec::with_capacity(deps.len());
        for mut dep in deps {
            let checksum = dep.checksum();
            if !is_hex_digest(checksum.hash()) {
                return Err(CacheError::InvalidHash {
                    hash: checksum.hash().to_string(),
                    id: dep.id,
                    version: dep.version,
                });
            }

            let member = cache_member(&dep);
            let uri = format!("{FILE_SCHEME}/{member}");
            tracing::info!("Downloading {} {} from {}", dep.id, dep.version, dep.uri);

            let reader = self
                .transport
                .fetch(root, &dep.uri)
                .map_err(|source| CacheError::Fetch {
                    id: dep.id.clone(),
                    version: dep.version.clone(),
                    source,
                })?;
            let mut validated = ValidatedReader::new(reader, checksum);

            let result = if dep.uri == uri {
                // Already cached: read it back instead of truncating it.
                io::copy(&mut validated, &mut io::sink())
            } else {
                let path = root.join(&member);
                let mut file = File::create(&path).map_err(|source| CacheError::Create {
                    path: path.clone(),
                    source,
                })?;
                io::copy(&mut validated, &mut file)
            };

            if let Err(source) = result {
                return Err(if is_checksum_mismatch(&source) {
                    CacheError::ChecksumMismatch {
                        id: dep.id,
                        version: dep.version,
                        source,
                    }
                } else {
                    CacheError::Copy {
                        id: dep.id,
                        version: dep.version,
                        source,
                    }
                });
            }

            tracing::info!("Cached {} {} as {member}", dep.id, dep.version);
            dep.uri = uri;
            cached.push(dep);
        }

        Ok(cached)
    }
}

/// Cache file names are the payload digest, so only hex is allowed.
fn is_hex_digest(hash: &str) -> bool {
    !hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit())
}
