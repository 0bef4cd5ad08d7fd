//! Machine-readable manifest index emission.
//!
//! Serializes the scanned records into `index.yaml` (one entry per
//! manifest) and `index.json` (same data plus description and host
//! commands, for client-side search).

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::manifest::ManifestRecord;

#[derive(Debug, Serialize)]
struct YamlEntry<'a> {
    namespace: &'a str,
    name: &'a str,
    tag: &'a str,
    path: &'a str,
    commands: Vec<&'a str>,
    command_count: usize,
    imports: &'a [String],
}

#[derive(Debug, Serialize)]
struct JsonEntry<'a> {
    #[serde(flatten)]
    base: YamlEntry<'a>,
    description: &'a str,
    host_commands: &'a [serde_yaml_ng::Value],
}

#[derive(Debug, Serialize)]
struct Index<T> {
    manifests: Vec<T>,
}

fn yaml_entry(record: &ManifestRecord) -> YamlEntry<'_> {
    YamlEntry {
        namespace: &record.namespace,
        name: &record.name,
        tag: &record.tag,
        path: &record.path,
        commands: record.command_names(),
        command_count: record.commands.len(),
        imports: &record.imports,
    }
}

/// Write `index.yaml` for the given records.
pub fn write_index_yaml(records: &[ManifestRecord], out: &Path) -> Result<()> {
    let index = Index {
        manifests: records.iter().map(yaml_entry).collect(),
    };
    let rendered = serde_yaml_ng::to_string(&index).context("Failed to serialize index.yaml")?;
    std::fs::write(out, rendered)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    Ok(())
}

/// Write `index.json` for the given records.
pub fn write_index_json(records: &[ManifestRecord], out: &Path) -> Result<()> {
    let index = Index {
        manifests: records
            .iter()
            .map(|record| JsonEntry {
                base: yaml_entry(record),
                description: &record.description,
                host_commands: &record.host_commands,
            })
            .collect(),
    };
    let rendered =
        serde_json::to_string_pretty(&index).context("Failed to serialize index.json")?;
    std::fs::write(out, rendered)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    Ok(())
}
