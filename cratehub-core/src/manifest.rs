//! Manifest documents and the on-disk naming convention.
//!
//! A manifest is a YAML file describing one crate's runnable commands and
//! their container images. Within a namespace directory, `<crate>.yaml` is
//! the bare/default-tag file and `<crate>_<tag>.yaml` is a tagged variant;
//! the bare file may be a regular file or a symlink to a tagged variant.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::version::is_numeric_version;

/// Tag assigned to the bare (untagged) manifest file of a crate.
pub const DEFAULT_TAG: &str = "default";

/// A manifest file: top-level mapping with a required `manifest` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    pub manifest: ManifestDoc,
}

/// The `manifest` mapping of a manifest file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestDoc {
    #[serde(default)]
    pub name: Option<String>,

    /// Declared version. Accepts bare YAML scalars (`version: 2.1` parses
    /// as a float) and normalizes them to their string rendering.
    #[serde(default, deserialize_with = "de_scalar_string")]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub commands: Option<Vec<CommandEntry>>,

    /// Import references in `namespace/crate:tag` form.
    #[serde(default)]
    pub imports: Option<Vec<String>>,

    /// Host commands are opaque beyond counting and index emission.
    #[serde(default)]
    pub host_commands: Option<Vec<serde_yaml_ng::Value>>,
}

/// One command entry binding a name to a container image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandEntry {
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub docker_image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_args: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn de_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml_ng::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

/// Render a YAML scalar as a string; non-scalars yield `None`.
pub fn scalar_to_string(value: &serde_yaml_ng::Value) -> Option<String> {
    match value {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A parsed manifest plus its registry identity, derived from the file's
/// location and name. Immutable once built.
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    /// Namespace, equal to the parent directory name.
    pub namespace: String,
    /// Crate name within the namespace.
    pub crate_name: String,
    /// Tag from the filename convention; `default` for a bare file.
    pub tag: String,
    /// Declared `manifest.name` (conventionally `namespace/crate`).
    pub name: String,
    /// Declared version; may be empty.
    pub version: String,
    pub description: String,
    pub commands: Vec<CommandEntry>,
    pub imports: Vec<String>,
    pub host_commands: Vec<serde_yaml_ng::Value>,
    /// Source path relative to the registry root (`namespace/file.yaml`).
    pub path: String,
    pub filename: String,
}

impl ManifestRecord {
    /// Parse a manifest file into a record. The parent directory name is
    /// the namespace; the filename stem yields crate name and tag.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let file: ManifestFile = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

        let namespace = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let stem = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let (stem_name, tag) = split_stem(stem);

        let doc = file.manifest;
        let name = doc.name.unwrap_or_else(|| stem.to_string());
        // Crate identity comes from the declared name when it is
        // namespaced, otherwise from the filename stem.
        let crate_name = name
            .split_once('/')
            .map(|(_, c)| c.to_string())
            .unwrap_or_else(|| stem_name.to_string());

        Ok(Self {
            namespace: namespace.clone(),
            crate_name,
            tag: tag.to_string(),
            name,
            version: doc.version.unwrap_or_default(),
            description: doc.description.unwrap_or_default(),
            commands: doc.commands.unwrap_or_default(),
            imports: doc.imports.unwrap_or_default(),
            host_commands: doc.host_commands.unwrap_or_default(),
            path: format!("{namespace}/{filename}"),
            filename,
        })
    }

    /// Names of this record's commands, in manifest order.
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.command.as_str()).collect()
    }
}

/// Split a filename stem into `(crate_name, tag)`. Any `_` suffix is a
/// tag; a stem without `_` is the bare file and carries [`DEFAULT_TAG`].
pub fn split_stem(stem: &str) -> (&str, &str) {
    match stem.split_once('_') {
        Some((name, tag)) => (name, tag),
        None => (stem, DEFAULT_TAG),
    }
}

/// Migration-time classification of a filename stem.
///
/// `crate_X` with strict-numeric `X` is a versioned file for `crate`;
/// a non-numeric suffix does not split — `demo_strict` is its own bare
/// crate, never a version of `demo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrateStem {
    Versioned { name: String, version: String },
    Bare { name: String },
}

impl CrateStem {
    pub fn parse(stem: &str) -> Self {
        match stem.split_once('_') {
            Some((name, suffix)) if is_numeric_version(suffix) => CrateStem::Versioned {
                name: name.to_string(),
                version: suffix.to_string(),
            },
            _ => CrateStem::Bare {
                name: stem.to_string(),
            },
        }
    }
}

/// A lazily parsed container image reference. Never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, when the first path segment contains a dot
    /// (`quay.io`, `ghcr.io`).
    pub registry: Option<String>,
    /// Repository path without the registry host.
    pub repository: String,
    /// Explicit tag; absence implies the registry default (`latest`).
    pub tag: Option<String>,
}

impl ImageReference {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (path, tag) = match raw.rsplit_once(':') {
            Some((p, t)) if !t.contains('/') => (p, Some(t.to_string())),
            _ => (raw, None),
        };
        let (registry, repository) = match path.split_once('/') {
            Some((first, rest)) if first.contains('.') => {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, path.to_string()),
        };
        Self {
            registry,
            repository,
            tag,
        }
    }
}

/// Read the declared `manifest.version` of a file, tolerating any
/// malformed content. Parse failures read as "no version".
pub fn read_declared_version(path: &Path) -> String {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("Could not read {}: {}", path.display(), e);
            return String::new();
        }
    };
    let value: serde_yaml_ng::Value = match serde_yaml_ng::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Could not parse {}: {}", path.display(), e);
            return String::new();
        }
    };
    value
        .get("manifest")
        .and_then(|m| m.get("version"))
        .and_then(scalar_to_string)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn stem_splits_on_first_underscore() {
        assert_eq!(split_stem("pepatac_1.0.13"), ("pepatac", "1.0.13"));
        assert_eq!(split_stem("demo"), ("demo", "default"));
        assert_eq!(split_stem("demo_strict_1.0"), ("demo", "strict_1.0"));
    }

    #[test]
    fn crate_stem_requires_numeric_suffix() {
        assert_eq!(
            CrateStem::parse("refgenie_3.0.0"),
            CrateStem::Versioned {
                name: "refgenie".to_string(),
                version: "3.0.0".to_string()
            }
        );
        assert_eq!(
            CrateStem::parse("demo_strict"),
            CrateStem::Bare {
                name: "demo_strict".to_string()
            }
        );
        assert_eq!(
            CrateStem::parse("demo"),
            CrateStem::Bare {
                name: "demo".to_string()
            }
        );
    }

    #[test]
    fn image_reference_parsing() {
        let r = ImageReference::parse("quay.io/biocontainers/samtools:1.21");
        assert_eq!(r.registry.as_deref(), Some("quay.io"));
        assert_eq!(r.repository, "biocontainers/samtools");
        assert_eq!(r.tag.as_deref(), Some("1.21"));

        let r = ImageReference::parse("databio/pepatac:latest");
        assert_eq!(r.registry, None);
        assert_eq!(r.repository, "databio/pepatac");
        assert_eq!(r.tag.as_deref(), Some("latest"));

        let r = ImageReference::parse("openjdk");
        assert_eq!(r.registry, None);
        assert_eq!(r.repository, "openjdk");
        assert_eq!(r.tag, None);
    }

    #[test]
    fn record_from_file_derives_identity() {
        let dir = tempfile::tempdir().unwrap();
        let ns = dir.path().join("bio");
        std::fs::create_dir(&ns).unwrap();
        let path = ns.join("aligner_1.2.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            "manifest:\n  name: bio/aligner\n  version: 1.2\n  commands:\n    - command: bwa\n      docker_image: biocontainers/bwa:0.7.17\n"
        )
        .unwrap();

        let record = ManifestRecord::from_file(&path).unwrap();
        assert_eq!(record.namespace, "bio");
        assert_eq!(record.crate_name, "aligner");
        assert_eq!(record.tag, "1.2");
        // Bare scalar versions normalize to their string rendering.
        assert_eq!(record.version, "1.2");
        assert_eq!(record.path, "bio/aligner_1.2.yaml");
        assert_eq!(record.command_names(), vec!["bwa"]);
    }

    #[test]
    fn declared_version_tolerates_junk() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.yaml");
        std::fs::write(&good, "manifest:\n  version: 2.1\n").unwrap();
        assert_eq!(read_declared_version(&good), "2.1");

        let bad = dir.path().join("b.yaml");
        std::fs::write(&bad, ": not yaml : [\n").unwrap();
        assert_eq!(read_declared_version(&bad), "");

        let missing = dir.path().join("c.yaml");
        assert_eq!(read_declared_version(&missing), "");
    }
}
