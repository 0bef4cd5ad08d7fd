//! Repository model: namespaces -> crates -> tagged manifests.
//!
//! A namespace corresponds 1:1 with a top-level directory of the registry
//! root. Scanning is one level deep: namespace directories, then their
//! `*.yaml` manifests.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::manifest::ManifestRecord;
use crate::version::version_gt;

/// Directory names never scanned for manifests.
pub const DEFAULT_SKIP_DIRS: &[&str] = &["docs", "_templates", ".git", ".github"];

/// Explicit scan configuration: registry root plus skip set. Passed into
/// every entry point; there is no process-wide scan state.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub skip_dirs: BTreeSet<String>,
}

impl ScanConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Namespace directories under the root, sorted by name. Hidden
/// directories and the skip set are excluded.
pub fn namespace_dirs(config: &ScanConfig) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(&config.root)
        .with_context(|| format!("Failed to read registry root: {}", config.root.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || config.skip_dirs.contains(name) {
            continue;
        }
        dirs.push(path);
    }
    dirs.sort();
    Ok(dirs)
}

/// Manifest YAML files under the root, sorted namespace-by-namespace.
/// Symlinked bare files are included; callers that must not see a
/// versioned file twice filter them out.
pub fn discover_manifest_files(config: &ScanConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir in namespace_dirs(config)? {
        let mut in_dir = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read namespace: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|e| e == "yaml").unwrap_or(false) {
                in_dir.push(path);
            }
        }
        in_dir.sort();
        files.extend(in_dir);
    }
    Ok(files)
}

/// Parse every regular manifest file into records. Symlinks are skipped
/// (they duplicate a versioned file); unparseable files are logged and
/// skipped.
pub fn load_records(config: &ScanConfig) -> Result<Vec<ManifestRecord>> {
    let mut records = Vec::new();
    for path in discover_manifest_files(config)? {
        if path.is_symlink() {
            debug!("Skipping symlink: {}", path.display());
            continue;
        }
        match ManifestRecord::from_file(&path) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping unparseable manifest {}: {:#}", path.display(), e),
        }
    }
    Ok(records)
}

/// A named unit of functionality within a namespace, owning its tagged
/// manifest variants. The tag set is never empty once the crate exists
/// and `latest_tag` always names a present tag.
#[derive(Debug, Clone)]
pub struct Crate {
    pub namespace: String,
    pub name: String,
    pub tags: BTreeMap<String, ManifestRecord>,
    pub latest_tag: String,
    pub description: String,
}

impl Crate {
    fn new(record: ManifestRecord) -> Self {
        let mut tags = BTreeMap::new();
        let latest_tag = record.tag.clone();
        let description = record.description.clone();
        let (namespace, name) = (record.namespace.clone(), record.crate_name.clone());
        tags.insert(record.tag.clone(), record);
        Self {
            namespace,
            name,
            tags,
            latest_tag,
            description,
        }
    }

    /// Insert a tagged variant, moving `latest_tag` when the new record's
    /// declared version strictly supersedes the current latest. Ties keep
    /// the existing latest and its description.
    fn insert(&mut self, record: ManifestRecord) {
        let tag = record.tag.clone();
        let version = record.version.clone();
        let description = record.description.clone();
        self.tags.insert(tag.clone(), record);

        if version.is_empty() {
            return;
        }
        let current_version = self
            .tags
            .get(&self.latest_tag)
            .map(|r| r.version.as_str())
            .unwrap_or_default();
        if version_gt(&version, current_version) {
            self.latest_tag = tag;
            if !description.is_empty() {
                self.description = description;
            }
        }
    }

    /// The record `latest_tag` points at.
    pub fn latest(&self) -> &ManifestRecord {
        &self.tags[&self.latest_tag]
    }
}

/// Top-level grouping of crates, one per source directory.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub name: String,
    pub crates: BTreeMap<String, Crate>,
}

/// The full in-memory registry: namespaces -> crates -> tags.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub namespaces: BTreeMap<String, Namespace>,
}

impl Registry {
    /// Build the model from parsed records. Insertion order does not
    /// affect the final `latest_tag` of any crate.
    pub fn from_records(records: Vec<ManifestRecord>) -> Self {
        let mut registry = Registry::default();
        for record in records {
            registry.insert(record);
        }
        registry
    }

    /// Scan the registry root and build the model.
    pub fn scan(config: &ScanConfig) -> Result<Self> {
        Ok(Self::from_records(load_records(config)?))
    }

    fn insert(&mut self, record: ManifestRecord) {
        let namespace = self
            .namespaces
            .entry(record.namespace.clone())
            .or_insert_with(|| Namespace {
                name: record.namespace.clone(),
                crates: BTreeMap::new(),
            });
        match namespace.crates.entry(record.crate_name.clone()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(Crate::new(record));
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                slot.get_mut().insert(record);
            }
        }
    }

    pub fn crate_count(&self) -> usize {
        self.namespaces.values().map(|ns| ns.crates.len()).sum()
    }

    pub fn manifest_count(&self) -> usize {
        self.namespaces
            .values()
            .flat_map(|ns| ns.crates.values())
            .map(|c| c.tags.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(tag: &str, version: &str, description: &str) -> ManifestRecord {
        ManifestRecord {
            namespace: "bio".to_string(),
            crate_name: "aligner".to_string(),
            tag: tag.to_string(),
            name: "bio/aligner".to_string(),
            version: version.to_string(),
            description: description.to_string(),
            commands: Vec::new(),
            imports: Vec::new(),
            host_commands: Vec::new(),
            path: format!("bio/aligner_{tag}.yaml"),
            filename: format!("aligner_{tag}.yaml"),
        }
    }

    #[test]
    fn latest_tag_tracks_highest_version() {
        let registry = Registry::from_records(vec![
            record("1.0.9", "1.0.9", "old"),
            record("1.0.10", "1.0.10", "new"),
            record("1.0.2", "1.0.2", ""),
        ]);
        let krate = &registry.namespaces["bio"].crates["aligner"];
        assert_eq!(krate.latest_tag, "1.0.10");
        assert_eq!(krate.description, "new");
        assert_eq!(krate.tags.len(), 3);
    }

    #[test]
    fn latest_resolution_is_order_independent() {
        let tags = ["1.0.9", "1.0.10", "1.0.2", "default"];
        let make = |order: &[usize]| {
            let records = order
                .iter()
                .map(|&i| {
                    let tag = tags[i];
                    let version = if tag == "default" { "" } else { tag };
                    record(tag, version, "")
                })
                .collect();
            let registry = Registry::from_records(records);
            registry.namespaces["bio"].crates["aligner"].latest_tag.clone()
        };
        assert_eq!(make(&[0, 1, 2, 3]), "1.0.10");
        assert_eq!(make(&[3, 2, 1, 0]), "1.0.10");
        assert_eq!(make(&[2, 0, 3, 1]), "1.0.10");
    }

    #[test]
    fn version_ties_keep_existing_latest() {
        let registry = Registry::from_records(vec![
            record("a", "2.0", "first"),
            record("b", "2.0", "second"),
        ]);
        let krate = &registry.namespaces["bio"].crates["aligner"];
        assert_eq!(krate.latest_tag, "a");
        assert_eq!(krate.description, "first");
    }

    #[test]
    fn scan_skips_configured_directories() {
        let dir = tempfile::tempdir().unwrap();
        for ns in ["bio", "docs", ".hidden"] {
            std::fs::create_dir(dir.path().join(ns)).unwrap();
        }
        std::fs::write(
            dir.path().join("bio/demo.yaml"),
            "manifest:\n  name: bio/demo\n  commands:\n    - command: x\n      docker_image: a/b:1\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("docs/demo.yaml"), "manifest: {}\n").unwrap();

        let config = ScanConfig::new(dir.path());
        let files = discover_manifest_files(&config).unwrap();
        assert_eq!(files.len(), 1);

        let registry = Registry::scan(&config).unwrap();
        assert_eq!(registry.crate_count(), 1);
        assert_eq!(registry.manifest_count(), 1);
        let krate = &registry.namespaces["bio"].crates["demo"];
        assert_eq!(krate.latest_tag, "default");
        assert_eq!(krate.latest().command_names(), vec!["x"]);
    }
}
