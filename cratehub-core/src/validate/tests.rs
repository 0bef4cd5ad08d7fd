//! Structural validation tests.

use super::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tempfile::TempDir;

/// Write `content` as `<namespace>/<file>` under a fresh root and
/// validate it.
fn validate(namespace: &str, file: &str, content: &str) -> (TempDir, ValidationReport) {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join(namespace);
    std::fs::create_dir(&dir).unwrap();
    let path = dir.join(file);
    std::fs::write(&path, content).unwrap();
    let report = validate_structure(&path, root.path());
    (root, report)
}

fn error_kinds(report: &ValidationReport) -> Vec<DiagnosticKind> {
    report.errors.iter().map(|d| d.kind).collect()
}

#[test]
fn well_formed_manifest_passes() {
    let (_root, report) = validate(
        "bio",
        "aligner.yaml",
        r#"
manifest:
  name: bio/aligner
  version: "1.0.0"
  commands:
    - command: bwa
      docker_image: biocontainers/bwa:0.7.17
    - command: samtools
      docker_image: quay.io/biocontainers/samtools:1.21
"#,
    );
    assert!(report.passing(), "errors: {:?}", report.errors);
    assert_eq!(report.warnings.len(), 0);
    assert_eq!(report.path, "bio/aligner.yaml");
}

#[test]
fn unparseable_yaml_short_circuits_with_one_error() {
    let (_root, report) = validate("bio", "bad.yaml", ": not yaml : [\n");
    assert_eq!(error_kinds(&report), vec![DiagnosticKind::Parse]);
    assert!(report.warnings.is_empty());
    assert!(report.infos.is_empty());
}

#[test]
fn missing_manifest_key_is_an_error() {
    let (_root, report) = validate("bio", "x.yaml", "other: {}\n");
    assert_eq!(error_kinds(&report), vec![DiagnosticKind::Schema]);
}

#[test]
fn namespace_mismatch_is_an_error_crate_mismatch_a_warning() {
    let (_root, report) = validate(
        "bio",
        "aligner.yaml",
        r#"
manifest:
  name: tools/mapper
  version: "1.0"
  commands:
    - command: map
      docker_image: a/b:1
"#,
    );
    assert_eq!(error_kinds(&report), vec![DiagnosticKind::NamespaceMismatch]);
    assert!(report
        .warnings
        .iter()
        .any(|d| d.kind == DiagnosticKind::CrateNameMismatch));
}

#[test]
fn tagged_filename_stem_strips_tag_suffix() {
    let (_root, report) = validate(
        "bio",
        "aligner_1.0.yaml",
        r#"
manifest:
  name: bio/aligner
  version: "1.0"
  commands:
    - command: map
      docker_image: a/b:1
"#,
    );
    assert!(report.passing());
    assert!(report.warnings.is_empty());
}

#[test]
fn missing_version_is_a_warning_not_an_error() {
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        r#"
manifest:
  name: bio/demo
  commands:
    - command: x
      docker_image: a/b:1
"#,
    );
    assert!(report.passing());
    assert!(report
        .warnings
        .iter()
        .any(|d| d.kind == DiagnosticKind::MissingVersion));
}

#[test]
fn host_command_only_manifest_passes_with_info() {
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        r#"
manifest:
  name: bio/demo
  version: "1.0"
  commands: []
  host_commands:
    - md5sum
"#,
    );
    assert_eq!(report.errors.len(), 0);
    assert_eq!(report.infos.len(), 1);
    assert_eq!(report.infos[0].kind, DiagnosticKind::HostCommandOnly);
    assert!(report.infos[0].message.contains("1 host commands"));
}

#[test]
fn empty_commands_without_host_commands_is_an_error() {
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        "manifest:\n  name: bio/demo\n  version: \"1.0\"\n  commands: []\n",
    );
    assert_eq!(error_kinds(&report), vec![DiagnosticKind::Schema]);
}

#[test]
fn duplicate_command_names_report_count_once() {
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        r#"
manifest:
  name: bio/demo
  version: "1.0"
  commands:
    - command: align
      docker_image: a/b:1
    - command: align
      docker_image: a/c:2
"#,
    );
    let dupes: Vec<_> = report
        .errors
        .iter()
        .filter(|d| d.kind == DiagnosticKind::DuplicateCommand)
        .collect();
    assert_eq!(dupes.len(), 1);
    assert!(dupes[0].message.contains("\"align\""));
    assert!(dupes[0].message.contains("appears 2 times"));
}

#[test]
fn image_with_whitespace_is_an_error() {
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        r#"
manifest:
  name: bio/demo
  version: "1.0"
  commands:
    - command: x
      docker_image: "foo bar"
"#,
    );
    assert_eq!(error_kinds(&report), vec![DiagnosticKind::InvalidImageFormat]);
    assert!(report.errors[0].message.contains("whitespace"));
}

#[test]
fn untagged_image_is_a_warning() {
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        r#"
manifest:
  name: bio/demo
  version: "1.0"
  commands:
    - command: x
      docker_image: databio/pepatac
"#,
    );
    assert!(report.passing());
    assert!(report
        .warnings
        .iter()
        .any(|d| d.kind == DiagnosticKind::UntaggedImage));
}

#[test]
fn non_string_optional_fields_are_warnings() {
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        r#"
manifest:
  name: bio/demo
  version: "1.0"
  commands:
    - command: x
      docker_image: a/b:1
      docker_args: [one, two]
"#,
    );
    assert!(report.passing());
    let warn = report
        .warnings
        .iter()
        .find(|d| d.kind == DiagnosticKind::NonStringField)
        .unwrap();
    assert!(warn.message.contains("docker_args"));
    assert!(warn.message.contains("list"));
}

#[test]
fn invalid_imports_are_errors() {
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        r#"
manifest:
  name: bio/demo
  version: "1.0"
  commands:
    - command: x
      docker_image: a/b:1
  imports:
    - bio/aligner:1.0
    - not-an-import
    - 42
"#,
    );
    let import_errors: Vec<_> = report
        .errors
        .iter()
        .filter(|d| d.kind == DiagnosticKind::InvalidImport)
        .collect();
    assert_eq!(import_errors.len(), 2);
}

#[test]
fn checks_run_independently() {
    // A bad image must not suppress the duplicate check and vice versa.
    let (_root, report) = validate(
        "bio",
        "demo.yaml",
        r#"
manifest:
  name: bio/demo
  commands:
    - command: x
      docker_image: "foo bar"
    - command: x
      docker_image: a/b:1
"#,
    );
    assert!(report
        .errors
        .iter()
        .any(|d| d.kind == DiagnosticKind::InvalidImageFormat));
    assert!(report
        .errors
        .iter()
        .any(|d| d.kind == DiagnosticKind::DuplicateCommand));
    assert!(report
        .warnings
        .iter()
        .any(|d| d.kind == DiagnosticKind::MissingVersion));
}

#[test]
fn image_collection_spans_failing_manifests() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("bio");
    std::fs::create_dir(&dir).unwrap();
    // Fails Tier 1 (duplicate commands) but its images still collect.
    std::fs::write(
        dir.join("demo.yaml"),
        r#"
manifest:
  name: bio/demo
  commands:
    - command: x
      docker_image: a/b:1
    - command: x
      docker_image: a/b:1
    - command: y
      docker_image: c/d:2
"#,
    )
    .unwrap();

    let files: Vec<PathBuf> = vec![dir.join("demo.yaml")];
    let images = collect_images(&files);
    // De-duplicated across occurrences.
    assert_eq!(images.len(), 2);
    assert!(images.contains("a/b:1"));
    assert!(images.contains("c/d:2"));
}

#[test]
fn run_structural_aggregates_totals() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("bio");
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(
        dir.join("good.yaml"),
        "manifest:\n  name: bio/good\n  version: \"1.0\"\n  commands:\n    - command: x\n      docker_image: a/b:1\n",
    )
    .unwrap();
    std::fs::write(dir.join("bad.yaml"), "manifest: []\n").unwrap();

    let config = ScanConfig::new(root.path());
    let outcome = run_structural(&config).unwrap();
    assert_eq!(outcome.reports.len(), 2);
    assert_eq!(outcome.passed_count(), 1);
    assert_eq!(outcome.total_errors, 1);
    assert_eq!(outcome.images.len(), 1);
}
