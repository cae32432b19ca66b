//! Implementation of the `jam update-dependencies` command.

use anyhow::{Context, Result};
use jam_pkg::{dependencies_within_constraint, CatalogClient, DependencyEntry, Manifest};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

/// Options for the update-dependencies command.
#[derive(Debug)]
pub struct UpdateOptions {
    /// Path to the buildpack's manifest.
    pub buildpack_file: PathBuf,
}

/// Result of an update operation.
#[derive(Debug, Default)]
pub struct UpdateResult {
    /// Dependency versions that were added, as `id version`.
    pub added: Vec<String>,
    /// Dependency versions that were removed, as `id version`.
    pub removed: Vec<String>,
    /// Whether the manifest was rewritten.
    pub modified: bool,
}

impl UpdateResult {
    /// Returns true if no versions were added or removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Print a summary of the changes.
    pub fn print_summary(&self) {
        if self.is_empty() {
            println!("No updates available.");
            return;
        }

        if !self.added.is_empty() {
            println!("Added:");
            for name in &self.added {
                println!("  + {name}");
            }
        }

        if !self.removed.is_empty() {
            println!("Removed:");
            for name in &self.removed {
                println!("  - {name}");
            }
        }
    }
}

/// Refresh every constrained dependency from the catalog.
///
/// Each id is queried once, however many constraints mention it. The
/// versions selected by all of an id's constraints replace that id's
/// existing entries in place; ids without constraints are left untouched.
pub fn update_dependencies(options: &UpdateOptions, client: &CatalogClient) -> Result<UpdateResult> {
    let path = &options.buildpack_file;
    let mut manifest = Manifest::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut catalog = HashMap::new();
    let mut refreshed: HashMap<String, Vec<DependencyEntry>> = HashMap::new();
    let mut order = Vec::new();

    for constraint in &manifest.metadata.dependency_constraints {
        if !catalog.contains_key(&constraint.id) {
            let records = client.fetch_all(&constraint.id)?;
            catalog.insert(constraint.id.clone(), records);
        }
        let records = &catalog[&constraint.id];

        let name = manifest
            .metadata
            .dependencies_for(&constraint.id)
            .map(|dep| dep.name.as_str())
            .find(|name| !name.is_empty())
            .unwrap_or(&constraint.id);

        tracing::info!(
            "Updating {} within {} ({} patches)",
            constraint.id,
            constraint.constraint,
            constraint.patches
        );
        let selected = dependencies_within_constraint(records, constraint, name)?;

        let entries = refreshed.entry(constraint.id.clone()).or_insert_with(|| {
            order.push(constraint.id.clone());
            Vec::new()
        });
        for dep in selected {
            if !entries.contains(&dep) {
                entries.push(dep);
            }
        }
    }

    let old = std::mem::take(&mut manifest.metadata.dependencies);
    let constrained: HashSet<String> = refreshed.keys().cloned().collect();
    let mut merged = Vec::with_capacity(old.len());
    for dep in &old {
        if let Some(entries) = refreshed.remove(&dep.id) {
            merged.extend(entries);
        } else if !constrained.contains(&dep.id) {
            merged.push(dep.clone());
        }
    }
    for id in order {
        if let Some(entries) = refreshed.remove(&id) {
            merged.extend(entries);
        }
    }

    let mut result = compute_changes(&old, &merged);
    if merged != old {
        manifest.metadata.dependencies = merged;
        manifest
            .write(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        result.modified = true;
    }

    Ok(result)
}

/// Compute which dependency versions appeared or disappeared.
fn compute_changes(old: &[DependencyEntry], new: &[DependencyEntry]) -> UpdateResult {
    let label = |dep: &DependencyEntry| format!("{} {}", dep.id, dep.version);
    let old: BTreeSet<String> = old.iter().map(label).collect();
    let new: BTreeSet<String> = new.iter().map(label).collect();

    UpdateResult {
        added: new.difference(&old).cloned().collect(),
        removed: old.difference(&new).cloned().collect(),
        modified: false,
    }
}
