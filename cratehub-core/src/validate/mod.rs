//! Validation pipeline, Tier 1: structural checks over one manifest
//! file's raw bytes. No network.
//!
//! Every check is independent; a failure in one does not suppress the
//! others, except the documented short-circuits (unparseable YAML, a
//! missing `manifest` mapping, and host-command-only manifests). A
//! report passes iff its error list is empty; warnings and infos never
//! affect the exit status.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml_ng::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::debug;

use crate::manifest::split_stem;
use crate::repo::{discover_manifest_files, ScanConfig};

pub mod registry;

#[cfg(test)]
mod tests;

/// Import references: `namespace/crate:tag`.
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+/[a-zA-Z0-9_.-]+:[a-zA-Z0-9_.-]+$").unwrap());

/// Conservative image shape: registry/repo with an optional tag.
static DOCKER_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._/-]+(:[a-zA-Z0-9._-]+)?$").unwrap());

/// The diagnostic taxonomy. Severity is carried by which report list a
/// diagnostic lands in, not by the kind itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Malformed document; fatal to this file's remaining checks.
    Parse,
    /// Missing or malformed required field.
    Schema,
    /// `manifest.name` namespace does not match the parent directory.
    NamespaceMismatch,
    /// `manifest.name` crate does not match the filename stem.
    CrateNameMismatch,
    /// Missing or empty `manifest.version`.
    MissingVersion,
    /// Image has no explicit tag.
    UntaggedImage,
    /// Optional field present with a non-string type.
    NonStringField,
    DuplicateCommand,
    InvalidImageFormat,
    InvalidImport,
    /// Tier 2 only: registry positively reported the tag missing.
    MissingRegistryTag,
    /// Informational notes.
    HostCommandOnly,
    SchemaValid,
    NoDuplicates,
}

/// One diagnostic entry in a report.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Per-file validation report: three ordered diagnostic lists. Created
/// once per file per run and never mutated after the pipeline finishes
/// with that file.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Path relative to the registry root.
    pub path: String,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub infos: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn new(path: String) -> Self {
        Self {
            path,
            errors: Vec::new(),
            warnings: Vec::new(),
            infos: Vec::new(),
        }
    }

    fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.errors.push(Diagnostic {
            kind,
            message: message.into(),
        });
    }

    fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.warnings.push(Diagnostic {
            kind,
            message: message.into(),
        });
    }

    fn info(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.infos.push(Diagnostic {
            kind,
            message: message.into(),
        });
    }

    /// A report passes iff it carries no errors.
    pub fn passing(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Tier 1 output for a whole run: one report per file plus the
/// de-duplicated image set Tier 2 consumes.
#[derive(Debug)]
pub struct StructuralOutcome {
    pub reports: Vec<ValidationReport>,
    pub images: BTreeSet<String>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl StructuralOutcome {
    pub fn passed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.passing()).count()
    }
}

fn yaml_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Sequence(s) => !s.is_empty(),
        Value::Mapping(m) => !m.is_empty(),
        _ => true,
    }
}

fn relative_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Tier 1 structural validation of a single manifest file.
pub fn validate_structure(path: &Path, root: &Path) -> ValidationReport {
    let mut report = ValidationReport::new(relative_path(path, root));
    debug!("Validating {}", report.path);

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            report.error(DiagnosticKind::Parse, format!("Could not read file: {e}"));
            return report;
        }
    };
    let data: Value = match serde_yaml_ng::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            report.error(DiagnosticKind::Parse, format!("YAML parse error: {e}"));
            return report;
        }
    };

    if !data.is_mapping() {
        report.error(
            DiagnosticKind::Parse,
            "File does not contain a YAML mapping",
        );
        return report;
    }

    let Some(manifest) = data.get("manifest") else {
        report.error(DiagnosticKind::Schema, "Missing top-level 'manifest' key");
        return report;
    };
    if !manifest.is_mapping() {
        report.error(DiagnosticKind::Schema, "'manifest' is not a mapping");
        return report;
    }

    check_name(&mut report, manifest, path);
    check_version(&mut report, manifest);

    // commands may be null/missing for host-command-only manifests
    let commands = manifest.get("commands").filter(|v| !v.is_null());
    let host_commands = manifest.get("host_commands").filter(|v| is_truthy(v));
    let commands_empty = match commands {
        None => true,
        Some(Value::Sequence(s)) => s.is_empty(),
        Some(_) => false,
    };
    if commands_empty {
        if let Some(hc) = host_commands {
            let count = hc.as_sequence().map(|s| s.len()).unwrap_or(1);
            report.info(
                DiagnosticKind::HostCommandOnly,
                format!("Host-command-only manifest ({count} host commands)"),
            );
        } else {
            report.error(
                DiagnosticKind::Schema,
                "'manifest.commands' is missing or empty (and no host_commands)",
            );
        }
        return report;
    }
    let Some(commands) = commands.and_then(|v| v.as_sequence()) else {
        report.error(DiagnosticKind::Schema, "'manifest.commands' must be a list");
        return report;
    };

    let command_names = check_commands(&mut report, commands);
    report.info(
        DiagnosticKind::SchemaValid,
        format!("Schema valid ({} commands)", commands.len()),
    );
    check_duplicates(&mut report, &command_names);
    check_imports(&mut report, manifest);

    report
}

fn check_name(report: &mut ValidationReport, manifest: &Value, path: &Path) {
    let Some(name) = non_empty_str(manifest.get("name")) else {
        report.error(DiagnosticKind::Schema, "Missing or empty 'manifest.name'");
        return;
    };
    let Some((name_ns, name_crate)) = name.split_once('/') else {
        report.error(
            DiagnosticKind::Schema,
            format!("manifest.name '{name}' has no namespace (expected 'namespace/crate')"),
        );
        return;
    };

    let parent_dir = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name_ns != parent_dir {
        report.error(
            DiagnosticKind::NamespaceMismatch,
            format!("manifest.name namespace '{name_ns}' does not match directory '{parent_dir}'"),
        );
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let (expected, _) = split_stem(stem);
    if name_crate != expected {
        report.warn(
            DiagnosticKind::CrateNameMismatch,
            format!("manifest.name crate '{name_crate}' does not match filename stem '{expected}'"),
        );
    }
}

fn check_version(report: &mut ValidationReport, manifest: &Value) {
    let version = manifest.get("version");
    let missing = match version {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    };
    if missing {
        // Host-command-only manifests may legitimately omit a version.
        report.warn(
            DiagnosticKind::MissingVersion,
            "Missing or empty 'manifest.version'",
        );
    }
}

fn check_commands(report: &mut ValidationReport, commands: &[Value]) -> Vec<String> {
    let mut command_names = Vec::new();

    for (i, cmd) in commands.iter().enumerate() {
        if !cmd.is_mapping() {
            report.error(
                DiagnosticKind::Schema,
                format!("Command #{} is not a mapping", i + 1),
            );
            continue;
        }

        let cmd_name = non_empty_str(cmd.get("command"));
        match cmd_name {
            Some(name) => command_names.push(name.to_string()),
            None => report.error(
                DiagnosticKind::Schema,
                format!("Command #{}: missing or empty 'command' field", i + 1),
            ),
        }
        let label = cmd_name
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("#{}", i + 1));

        match cmd.get("docker_image").and_then(|v| v.as_str()) {
            Some(img) if !img.trim().is_empty() => {
                if img.contains(' ') || img.contains('\t') {
                    report.error(
                        DiagnosticKind::InvalidImageFormat,
                        format!("Command '{label}': docker_image contains whitespace: '{img}'"),
                    );
                } else if !DOCKER_IMAGE_RE.is_match(img.trim()) {
                    report.error(
                        DiagnosticKind::InvalidImageFormat,
                        format!("Command '{label}': invalid docker_image format: '{img}'"),
                    );
                } else if !img.contains(':') {
                    report.warn(
                        DiagnosticKind::UntaggedImage,
                        format!("Command '{label}': image '{img}' has no explicit tag (will use :latest)"),
                    );
                }
            }
            _ => report.error(
                DiagnosticKind::Schema,
                format!("Command '{label}': missing or empty 'docker_image'"),
            ),
        }

        for field in ["docker_command", "docker_args", "description"] {
            if let Some(value) = cmd.get(field) {
                if !value.is_null() && !value.is_string() {
                    report.warn(
                        DiagnosticKind::NonStringField,
                        format!(
                            "Command '{label}': '{field}' should be a string, got {}",
                            yaml_type_name(value)
                        ),
                    );
                }
            }
        }
    }

    command_names
}

fn check_duplicates(report: &mut ValidationReport, command_names: &[String]) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in command_names {
        *counts.entry(name).or_insert(0) += 1;
    }

    let mut reported: BTreeSet<&str> = BTreeSet::new();
    let mut any = false;
    for name in command_names {
        let count = counts[name.as_str()];
        if count > 1 && reported.insert(name) {
            any = true;
            report.error(
                DiagnosticKind::DuplicateCommand,
                format!("Duplicate command: \"{name}\" (appears {count} times)"),
            );
        }
    }
    if !any {
        report.info(DiagnosticKind::NoDuplicates, "No duplicate commands");
    }
}

fn check_imports(report: &mut ValidationReport, manifest: &Value) {
    let Some(imports) = manifest.get("imports").filter(|v| !v.is_null()) else {
        return;
    };
    let Some(imports) = imports.as_sequence() else {
        report.error(DiagnosticKind::InvalidImport, "'manifest.imports' must be a list");
        return;
    };
    for imp in imports {
        match imp.as_str() {
            Some(s) if IMPORT_RE.is_match(s) => {}
            Some(s) => report.error(
                DiagnosticKind::InvalidImport,
                format!("Invalid import format: '{s}' (expected namespace/crate:tag)"),
            ),
            None => report.error(
                DiagnosticKind::InvalidImport,
                format!("Import entry is not a string: {}", yaml_type_name(imp)),
            ),
        }
    }
}

/// Collect every `docker_image` string across the given files, whether or
/// not the owning manifest passed Tier 1. Unreadable files contribute
/// nothing.
pub fn collect_images(files: &[std::path::PathBuf]) -> BTreeSet<String> {
    let mut images = BTreeSet::new();
    for path in files {
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let Ok(data) = serde_yaml_ng::from_str::<Value>(&content) else {
            continue;
        };
        let commands = data
            .get("manifest")
            .and_then(|m| m.get("commands"))
            .and_then(|c| c.as_sequence());
        for cmd in commands.into_iter().flatten() {
            if let Some(img) = non_empty_str(cmd.get("docker_image")) {
                images.insert(img.to_string());
            }
        }
    }
    images
}

/// Run Tier 1 over every discovered manifest file.
pub fn run_structural(config: &ScanConfig) -> anyhow::Result<StructuralOutcome> {
    let files = discover_manifest_files(config)?;
    let mut reports = Vec::new();
    for path in &files {
        reports.push(validate_structure(path, &config.root));
    }
    let images = collect_images(&files);
    let total_errors = reports.iter().map(|r| r.errors.len()).sum();
    let total_warnings = reports.iter().map(|r| r.warnings.len()).sum();
    Ok(StructuralOutcome {
        reports,
        images,
        total_errors,
        total_warnings,
    })
}
