//! Implementation of the `jam pack` command.

use anyhow::{Context, Result};
use jam_pkg::{
    build, cache_member, duplicate, run_pre_package, Bundler, DependencyCacher, Manifest,
    Transport, MANIFEST_FILE,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Options for the pack command.
#[derive(Debug)]
pub struct PackOptions {
    /// Path to the buildpack's manifest.
    pub buildpack: PathBuf,
    /// Version stamped into the packaged manifest.
    pub version: String,
    /// Destination `.tgz`.
    pub output: PathBuf,
    /// Download dependencies into the package.
    pub offline: bool,
    /// Only package dependencies for this stack.
    pub stack: Option<String>,
}

/// Package a buildpack.
///
/// Work happens in a scratch copy of the buildpack directory, so the
/// pre-package script and dependency downloads never touch the source tree.
/// The scratch copy is removed when this returns.
pub fn pack_buildpack<T: Transport>(options: &PackOptions, transport: T) -> Result<()> {
    let mut manifest = Manifest::from_path(&options.buildpack)
        .with_context(|| format!("Failed to read {}", options.buildpack.display()))?;

    let source_dir = match options.buildpack.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let manifest_name = options
        .buildpack
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(MANIFEST_FILE)
        .to_string();

    let scratch = TempDir::new().context("Failed to create scratch directory")?;
    let root = scratch.path();
    duplicate(&source_dir, root).context("Failed to copy buildpack")?;

    manifest.buildpack.version.clone_from(&options.version);
    println!(
        "Packing {} {}...",
        manifest.buildpack.name, manifest.buildpack.version
    );

    run_pre_package(&manifest.metadata.pre_package, root)?;

    if let Some(stack) = &options.stack {
        manifest.metadata.retain_stack(stack);
    }

    if options.offline {
        let dependencies = std::mem::take(&mut manifest.metadata.dependencies);
        let cached = DependencyCacher::new(transport)
            .cache(root, dependencies)
            .context("Failed to cache dependencies")?;

        for dependency in &cached {
            let member = cache_member(dependency);
            if !manifest.metadata.include_files.contains(&member) {
                manifest.metadata.include_files.push(member);
            }
        }
        manifest.metadata.dependencies = cached;
    }

    println!("  Building tarball:");
    let members = Bundler::default()
        .with_manifest_name(manifest_name)
        .bundle(root, &manifest.metadata.include_files, &manifest)?;

    create_parent(&options.output)?;
    build(&options.output, members)?;

    println!("Successfully packaged {}", options.output.display());
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}
