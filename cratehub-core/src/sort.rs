//! In-place alphabetical sorting of manifest commands.
//!
//! Rewrites `manifest.commands` into case-insensitive order by command
//! name, preserving every other key of the document. Files that are
//! already sorted, unreadable, or have nothing to sort are skipped.

use anyhow::{Context, Result};
use serde_yaml_ng::Value;
use std::path::Path;
use tracing::debug;

/// Outcome of sorting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortOutcome {
    /// File rewritten; carries the command count.
    Sorted(usize),
    /// Nothing to do (already sorted, unparseable, or no command list).
    Skipped,
}

fn command_key(entry: &Value) -> String {
    entry
        .get("command")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_lowercase()
}

/// Sort one manifest's commands in place. Unparseable files are skipped,
/// not failed; write errors do fail.
pub fn sort_file(path: &Path) -> Result<SortOutcome> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            debug!("Skipping unreadable {}: {}", path.display(), e);
            return Ok(SortOutcome::Skipped);
        }
    };
    let mut data: Value = match serde_yaml_ng::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            debug!("Skipping unparseable {}: {}", path.display(), e);
            return Ok(SortOutcome::Skipped);
        }
    };

    let Some(commands) = data
        .get_mut("manifest")
        .and_then(|m| m.get_mut("commands"))
        .and_then(|c| c.as_sequence_mut())
    else {
        return Ok(SortOutcome::Skipped);
    };
    if commands.is_empty() {
        return Ok(SortOutcome::Skipped);
    }

    let names: Vec<String> = commands.iter().map(command_key).collect();
    let mut sorted_names = names.clone();
    sorted_names.sort();
    if names == sorted_names {
        return Ok(SortOutcome::Skipped);
    }

    commands.sort_by_key(command_key);
    let count = commands.len();

    let rendered = serde_yaml_ng::to_string(&data)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(SortOutcome::Sorted(count))
}
