//! Dependency resolution and packaging for buildpacks.
//!
//! This crate provides:
//! - Parsing and writing of `buildpack.toml` manifests
//! - Constraint resolution, including `~>` and the `default` shorthand
//! - Catalog queries that refresh dependency versions within constraints
//! - Checksum-validated downloads and offline dependency caching
//! - Deterministic `.tgz` packaging of buildpack files

mod archive;
mod bundle;
mod cache;
mod checksum;
mod duplicate;
mod hook;
mod manifest;
mod registry;
mod resolve;
mod transport;
mod validate;

#[cfg(test)]
mod test_support;

pub use archive::{build, ArchiveError};
pub use bundle::{BundleError, BundleMember, Bundler};
pub use cache::{cache_member, CacheError, DependencyCacher, DEPENDENCIES_DIR};
pub use checksum::{Checksum, DEFAULT_ALGORITHM};
pub use duplicate::{duplicate, DuplicateError};
pub use hook::{run_pre_package, HookError};
pub use manifest::{
    BuildpackInfo, BuildpackLicense, DependencyConstraint, DependencyEntry, Manifest,
    ManifestError, Metadata, Order, OrderEntry, Stack, MANIFEST_FILE, WILDCARD_STACK,
};
pub use registry::{
    dependencies_within_constraint, CatalogClient, CatalogError, CatalogRecord, CatalogStack,
    DEFAULT_API,
};
pub use resolve::{parse_version, resolve, ConstraintExpr, ResolveError, VersionRange};
pub use transport::{ClientConfig, HttpTransport, Transport, TransportError, FILE_SCHEME};
pub use validate::{is_checksum_mismatch, ValidatedReader, ValidationError};
