//! Deterministic `.tgz` assembly.

use crate::bundle::BundleMember;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Mode given to implied parent directories.
const DIR_MODE: u32 = 0o755;

/// Errors that can occur while writing an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The output file could not be created.
    #[error("failed to create archive {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A member could not be written.
    #[error("failed to write {name} to archive: {source}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The tar or gzip trailer could not be written.
    #[error("failed to finish archive {}: {source}", .path.display())]
    Finish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Write `members` to a gzipped tarball at `output`.
///
/// Entries carry zeroed timestamps and ownership so the same inputs always
/// produce the same bytes. On error the output is left truncated and must
/// not be used.
///
/// # Errors
///
/// Returns an error if the output cannot be created or any member fails to
/// write.
pub fn build(output: &Path, members: Vec<BundleMember>) -> Result<(), ArchiveError> {
    let file = File::create(output).map_err(|source| ArchiveError::Create {
        path: output.to_path_buf(),
        source,
    })?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut directories = HashSet::new();

    for mut member in members {
        let write_err = |source| ArchiveError::Write {
            name: member.name.clone(),
            source,
        };

        append_parents(&mut builder, &member.name, &mut directories).map_err(write_err)?;

        tracing::info!("    {}", member.name);
        let mut header = header(member.mode);
        match &member.link {
            Some(target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                builder
                    .append_link(&mut header, &member.name, target)
                    .map_err(write_err)?;
            }
            None => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(member.size);
                builder
                    .append_data(&mut header, &member.name, &mut member.reader)
                    .map_err(write_err)?;
            }
        }
    }

    let finish_err = |source| ArchiveError::Finish {
        path: output.to_path_buf(),
        source,
    };
    let encoder = builder.into_inner().map_err(finish_err)?;
    let file = encoder.finish().map_err(finish_err)?;
    file.sync_all().map_err(finish_err)
}

fn header(mode: u32) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

/// Emit a directory entry for every ancestor of `name` not written yet.
fn append_parents<W: io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    written: &mut HashSet<String>,
) -> io::Result<()> {
    let mut prefix = String::new();
    let parts: Vec<&str> = name.split('/').collect();
    for part in &parts[..parts.len().saturating_sub(1)] {
        if part.is_empty() || *part == "." {
            continue;
        }
        prefix.push_str(part);
        prefix.push('/');
        if written.insert(prefix.clone()) {
            let mut header = header(DIR_MODE);
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            builder.append_data(&mut header, &prefix, io::empty())?;
        }
    }
    Ok(())
}
