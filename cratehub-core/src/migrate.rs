//! Symlink migration: canonicalize each crate into versioned files plus
//! a bare-name symlink pointing at the latest version.
//!
//! The engine is plan-then-apply. Planning classifies every crate's
//! on-disk state and emits an ordered action list with zero filesystem
//! mutation, so a dry run is the plan itself. Existing symlinks are
//! recognized and skipped unconditionally, which makes a second run over
//! a migrated namespace a no-op.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::error;

use crate::manifest::{read_declared_version, CrateStem};
use crate::repo::{namespace_dirs, ScanConfig};
use crate::version::NumericVersion;

/// What was observed on disk for one crate name at scan time. Consumed
/// once per migration run and discarded.
#[derive(Debug, Clone, Default)]
pub struct OnDiskCrateState {
    /// The bare `<crate>.yaml` file, if present as a regular file.
    pub bare: Option<PathBuf>,
    /// Versioned files keyed by their strict-numeric version string.
    pub versioned: BTreeMap<String, PathBuf>,
}

/// One planned filesystem mutation (or deliberate non-action).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationAction {
    /// Create a fresh bare-name symlink to a versioned file.
    CreateSymlink { link: PathBuf, target: String },
    /// Copy a bare file's content to a versioned file.
    CopyToVersioned { source: PathBuf, dest: PathBuf },
    /// Unlink the bare file and symlink it to a versioned file.
    ReplaceWithSymlink { bare: PathBuf, target: String },
    /// Leave the file untouched.
    Skip { path: PathBuf, reason: String },
}

impl MigrationAction {
    /// Whether applying this action mutates the filesystem.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, MigrationAction::Skip { .. })
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

impl fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationAction::CreateSymlink { link, target } => {
                write!(f, "CREATE symlink: {} -> {}", file_name(link), target)
            }
            MigrationAction::CopyToVersioned { source, dest } => {
                write!(f, "COPY: {} -> {}", file_name(source), file_name(dest))
            }
            MigrationAction::ReplaceWithSymlink { bare, target } => {
                write!(f, "SYMLINK: {} -> {}", file_name(bare), target)
            }
            MigrationAction::Skip { path, reason } => {
                write!(f, "SKIP ({}): {}", reason, file_name(path))
            }
        }
    }
}

/// Planned actions for one crate.
#[derive(Debug, Clone)]
pub struct CratePlan {
    pub name: String,
    pub actions: Vec<MigrationAction>,
}

/// The full plan for one namespace directory. Crates whose classification
/// failed are listed in `failures` and produce no actions.
#[derive(Debug, Clone)]
pub struct NamespacePlan {
    pub namespace: String,
    pub dir: PathBuf,
    /// Files already migrated in a previous run, skipped at scan time.
    pub skipped_symlinks: Vec<PathBuf>,
    pub crates: Vec<CratePlan>,
    pub failures: Vec<(String, String)>,
}

impl NamespacePlan {
    /// Count of actions that would mutate the filesystem.
    pub fn mutation_count(&self) -> usize {
        self.crates
            .iter()
            .flat_map(|c| &c.actions)
            .filter(|a| a.is_mutation())
            .count()
    }
}

/// Group a namespace directory's manifest files by crate name, putting
/// existing symlinks aside.
pub fn scan_namespace(dir: &Path) -> Result<(BTreeMap<String, OnDiskCrateState>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read namespace: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().map(|e| e == "yaml").unwrap_or(false) && !path.is_dir() {
            files.push(path);
        }
    }
    files.sort();

    let mut crates: BTreeMap<String, OnDiskCrateState> = BTreeMap::new();
    let mut symlinks = Vec::new();
    for path in files {
        if path.is_symlink() {
            symlinks.push(path);
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match CrateStem::parse(stem) {
            CrateStem::Versioned { name, version } => {
                crates.entry(name).or_default().versioned.insert(version, path);
            }
            CrateStem::Bare { name } => {
                crates.entry(name).or_default().bare = Some(path);
            }
        }
    }
    Ok((crates, symlinks))
}

/// Pick the filename of the maximum strict-numeric version among the
/// versioned files, plus an optional not-yet-materialized candidate.
/// A non-numeric version anywhere in the set fails the whole crate.
fn max_version_file(
    crate_name: &str,
    versioned: &BTreeMap<String, PathBuf>,
    extra: Option<(&str, &str)>,
) -> Result<String> {
    let mut best: Option<(NumericVersion, String)> = None;
    let mut candidates: Vec<(&str, String)> = versioned
        .iter()
        .map(|(v, p)| (v.as_str(), file_name(p).to_string()))
        .collect();
    if let Some((version, filename)) = extra {
        candidates.push((version, filename.to_string()));
    }

    for (version, filename) in candidates {
        let parsed: NumericVersion = version.parse().map_err(|_| {
            anyhow::anyhow!("crate '{crate_name}': non-numeric version '{version}'")
        })?;
        let replace = best.as_ref().map(|(b, _)| parsed > *b).unwrap_or(true);
        if replace {
            best = Some((parsed, filename));
        }
    }

    match best {
        Some((_, filename)) => Ok(filename),
        None => bail!("crate '{crate_name}': no versioned files"),
    }
}

/// Classify one crate's on-disk state into its terminal transition.
/// Pure projection: reads the bare file's version field but mutates
/// nothing.
pub fn plan_crate(dir: &Path, name: &str, state: &OnDiskCrateState) -> Result<Vec<MigrationAction>> {
    let mut actions = Vec::new();

    let bare = match (&state.bare, state.versioned.is_empty()) {
        (None, true) => return Ok(actions),
        // Versioned files only: link the bare name to the newest one.
        // An already-symlinked bare name means the crate is migrated.
        (None, false) => {
            let link = dir.join(format!("{name}.yaml"));
            if !link.is_symlink() {
                let target = max_version_file(name, &state.versioned, None)?;
                actions.push(MigrationAction::CreateSymlink { link, target });
            }
            return Ok(actions);
        }
        (Some(bare), _) => bare,
    };

    if !state.versioned.is_empty() {
        // Bare + versioned: preserve the bare content as a versioned file
        // first when its declared version is not already materialized,
        // then always point the bare name at the maximum version.
        let bare_version = read_declared_version(bare);
        let missing = !bare_version.is_empty() && !state.versioned.contains_key(&bare_version);
        let dest_name = format!("{name}_{bare_version}.yaml");
        let extra = missing.then_some((bare_version.as_str(), dest_name.as_str()));

        let target = max_version_file(name, &state.versioned, extra)?;
        if missing {
            actions.push(MigrationAction::CopyToVersioned {
                source: bare.clone(),
                dest: dir.join(&dest_name),
            });
        }
        actions.push(MigrationAction::ReplaceWithSymlink {
            bare: bare.clone(),
            target,
        });
        return Ok(actions);
    }

    // Bare only: a version field means the crate is versioned and gets
    // materialized; no version field marks an intentionally unversioned
    // crate.
    let bare_version = read_declared_version(bare);
    if bare_version.is_empty() {
        actions.push(MigrationAction::Skip {
            path: bare.clone(),
            reason: "unversioned".to_string(),
        });
        return Ok(actions);
    }
    let dest_name = format!("{name}_{bare_version}.yaml");
    actions.push(MigrationAction::CopyToVersioned {
        source: bare.clone(),
        dest: dir.join(&dest_name),
    });
    actions.push(MigrationAction::ReplaceWithSymlink {
        bare: bare.clone(),
        target: dest_name,
    });
    Ok(actions)
}

/// Plan a whole namespace directory. Crates that fail classification are
/// recorded and do not block their siblings.
pub fn plan_namespace(dir: &Path) -> Result<NamespacePlan> {
    let namespace = file_name(dir).to_string();
    let (crates, skipped_symlinks) = scan_namespace(dir)?;

    let mut plans = Vec::new();
    let mut failures = Vec::new();
    for (name, state) in &crates {
        match plan_crate(dir, name, state) {
            Ok(actions) if actions.is_empty() => {}
            Ok(actions) => plans.push(CratePlan {
                name: name.clone(),
                actions,
            }),
            Err(e) => failures.push((name.clone(), format!("{e:#}"))),
        }
    }

    Ok(NamespacePlan {
        namespace,
        dir: dir.to_path_buf(),
        skipped_symlinks,
        crates: plans,
        failures,
    })
}

/// Plan every namespace under the registry root.
pub fn plan_root(config: &ScanConfig) -> Result<Vec<NamespacePlan>> {
    let mut plans = Vec::new();
    for dir in namespace_dirs(config)? {
        plans.push(plan_namespace(&dir)?);
    }
    Ok(plans)
}

/// Execute a namespace plan. Crates apply independently; a failure is
/// logged and does not block siblings. Returns the number of mutations
/// performed.
pub fn apply_namespace(plan: &NamespacePlan) -> usize {
    let mut applied = 0;
    for krate in &plan.crates {
        if let Err(e) = apply_crate(krate, &mut applied) {
            error!(
                "Migration failed for crate '{}' in {}: {:#}",
                krate.name, plan.namespace, e
            );
        }
    }
    applied
}

fn apply_crate(plan: &CratePlan, applied: &mut usize) -> Result<()> {
    for action in &plan.actions {
        match action {
            MigrationAction::CopyToVersioned { source, dest } => {
                std::fs::copy(source, dest)
                    .with_context(|| format!("Failed to copy to {}", dest.display()))?;
                *applied += 1;
            }
            MigrationAction::CreateSymlink { link, target } => {
                symlink_file(link, target)?;
                *applied += 1;
            }
            MigrationAction::ReplaceWithSymlink { bare, target } => {
                std::fs::remove_file(bare)
                    .with_context(|| format!("Failed to unlink {}", bare.display()))?;
                symlink_file(bare, target)?;
                *applied += 1;
            }
            MigrationAction::Skip { .. } => {}
        }
    }
    Ok(())
}

/// Create a relative symlink named by file name only.
#[cfg(unix)]
fn symlink_file(link: &Path, target: &str) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("Failed to symlink {} -> {}", link.display(), target))
}

/// Targets without native symlinks get a content-identical copy plus an
/// entry in a `.links.yaml` side index recording the logical target.
#[cfg(not(unix))]
fn symlink_file(link: &Path, target: &str) -> Result<()> {
    let dir = link
        .parent()
        .with_context(|| format!("Link has no parent: {}", link.display()))?;
    std::fs::copy(dir.join(target), link)
        .with_context(|| format!("Failed to copy {} -> {}", target, link.display()))?;

    let index_path = dir.join(".links.yaml");
    let mut index: BTreeMap<String, String> = if index_path.exists() {
        let content = std::fs::read_to_string(&index_path)?;
        serde_yaml_ng::from_str(&content).unwrap_or_default()
    } else {
        BTreeMap::new()
    };
    index.insert(file_name(link).to_string(), target.to_string());
    std::fs::write(&index_path, serde_yaml_ng::to_string(&index)?)?;
    Ok(())
}
