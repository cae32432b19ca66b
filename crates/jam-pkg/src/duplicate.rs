//! Copying a buildpack tree into a scratch directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while duplicating a directory.
#[derive(Error, Debug)]
pub enum DuplicateError {
    #[error("failed to duplicate {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Sockets, FIFOs and device files cannot be packaged.
    #[error("failed to duplicate {}: not a regular file, directory or symlink", .path.display())]
    UnsupportedFileType { path: PathBuf },
}

/// Recursively copy `src` into `dst`.
///
/// File modes are kept and symlinks are recreated with their original
/// target. `dst` is created if needed.
///
/// # Errors
///
/// Returns an error naming the first path that could not be copied.
pub fn duplicate(src: &Path, dst: &Path) -> Result<(), DuplicateError> {
    let metadata = fs::metadata(src).map_err(io_err(src))?;
    fs::create_dir_all(dst).map_err(io_err(dst))?;
    fs::set_permissions(dst, metadata.permissions()).map_err(io_err(dst))?;

    for entry in fs::read_dir(src).map_err(io_err(src))? {
        let entry = entry.map_err(io_err(src))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(io_err(&from))?;

        if file_type.is_symlink() {
            copy_link(&from, &to).map_err(io_err(&from))?;
        } else if file_type.is_dir() {
            duplicate(&from, &to)?;
        } else if file_type.is_file() {
            fs::copy(&from, &to).map_err(io_err(&from))?;
        } else {
            return Err(DuplicateError::UnsupportedFileType { path: from });
        }
    }

    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> DuplicateError {
    let path = path.to_path_buf();
    move |source| DuplicateError::Io { path, source }
}

#[cfg(unix)]
fn copy_link(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_link(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}
