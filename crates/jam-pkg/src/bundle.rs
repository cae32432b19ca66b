//! Collection of the files that make up a packaged buildpack.

use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE};
use std::fs::{self, File, Metadata};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Mode given to the re-encoded manifest.
const MANIFEST_MODE: u32 = 0o644;

/// Errors that can occur while bundling files.
#[derive(Error, Debug)]
pub enum BundleError {
    /// The member could not be stat'ed, opened or resolved.
    #[error("failed to bundle {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The member is a symlink pointing outside the buildpack root.
    #[error("failed to bundle {name}: symlink target {} is outside the buildpack", .target.display())]
    LinkOutsideRoot { name: String, target: PathBuf },

    /// The member is neither a regular file nor a symlink.
    #[error("failed to bundle {name}: not a regular file")]
    NotAFile { name: String },

    /// The in-memory manifest could not be encoded.
    #[error("failed to bundle {name}: {source}")]
    Manifest {
        name: String,
        #[source]
        source: ManifestError,
    },
}

/// One archive member ready to be written.
pub struct BundleMember {
    /// Archive-relative path.
    pub name: String,
    /// Content stream; empty for symlinks.
    pub reader: Box<dyn Read>,
    pub size: u64,
    /// POSIX permission bits.
    pub mode: u32,
    /// Link target relative to the member's directory.
    pub link: Option<String>,
}

impl std::fmt::Debug for BundleMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleMember")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mode", &format_args!("{:o}", self.mode))
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

/// Turns a list of member names into [`BundleMember`]s.
#[derive(Debug, Clone)]
pub struct Bundler {
    manifest_name: String,
}

impl Default for Bundler {
    fn default() -> Self {
        Self {
            manifest_name: MANIFEST_FILE.to_string(),
        }
    }
}

impl Bundler {
    /// Use `name` as the member replaced by the in-memory manifest.
    #[must_use]
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// Open every member in `names` under `root`.
    ///
    /// The manifest member is taken from `manifest` rather than disk, so
    /// in-memory edits end up in the archive.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first member that cannot be read.
    pub fn bundle(
        &self,
        root: &Path,
        names: &[String],
        manifest: &Manifest,
    ) -> Result<Vec<BundleMember>, BundleError> {
        names
            .iter()
            .map(|name| {
                if *name == self.manifest_name {
                    manifest_member(name, manifest)
                } else {
                    file_member(root, name)
                }
            })
            .collect()
    }
}

fn manifest_member(name: &str, manifest: &Manifest) -> Result<BundleMember, BundleError> {
    let content = manifest
        .to_toml_string()
        .map_err(|source| BundleError::Manifest {
            name: name.to_string(),
            source,
        })?
        .into_bytes();

    Ok(BundleMember {
        name: name.to_string(),
        size: content.len() as u64,
        reader: Box::new(Cursor::new(content)),
        mode: MANIFEST_MODE,
        link: None,
    })
}

fn file_member(root: &Path, name: &str) -> Result<BundleMember, BundleError> {
    let io_err = |source| BundleError::Io {
        name: name.to_string(),
        source,
    };

    let path = root.join(name);
    let metadata = fs::symlink_metadata(&path).map_err(io_err)?;

    if metadata.file_type().is_symlink() {
        let link = link_target(root, &path, name)?;
        return Ok(BundleMember {
            name: name.to_string(),
            reader: Box::new(io::empty()),
            size: 0,
            mode: mode_of(&metadata),
            link: Some(link),
        });
    }

    if !metadata.is_file() {
        return Err(BundleError::NotAFile {
            name: name.to_string(),
        });
    }

    let file = File::open(&path).map_err(io_err)?;
    Ok(BundleMember {
        name: name.to_string(),
        reader: Box::new(file),
        size: metadata.len(),
        mode: mode_of(&metadata),
        link: None,
    })
}

/// Resolve the symlink at `path` and express its target relative to the
/// link's own directory.
fn link_target(root: &Path, path: &Path, name: &str) -> Result<String, BundleError> {
    let io_err = |source| BundleError::Io {
        name: name.to_string(),
        source,
    };

    let root = fs::canonicalize(root).map_err(io_err)?;
    let target = fs::canonicalize(path).map_err(io_err)?;
    if !target.starts_with(&root) {
        return Err(BundleError::LinkOutsideRoot {
            name: name.to_string(),
            target,
        });
    }

    let link_dir = match path.parent() {
        Some(dir) => fs::canonicalize(dir).map_err(io_err)?,
        None => root,
    };
    let relative = relative_path(&target, &link_dir);
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

/// `target` expressed relative to `base`. Both must be absolute and normalized.
fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component<'_>> = target.components().collect();
    let base: Vec<Component<'_>> = base.components().collect();
    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component);
    }
    relative
}

#[cfg(unix)]
fn mode_of(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        MANIFEST_MODE
    }
}
