//! cratehub - validate, migrate, sort, and index manifest registries.
//!
//! Diagnostics and summaries print to stdout; logs and Tier 2 progress
//! go to stderr. The process exit code is the sole machine-readable
//! success signal: 0 when zero errors across Tier 1 and (if run) Tier 2,
//! 1 otherwise.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cratehub_core::migrate;
use cratehub_core::repo::{discover_manifest_files, load_records, ScanConfig};
use cratehub_core::sort::{sort_file, SortOutcome};
use cratehub_core::validate::registry::{
    summarize, RegistryChecker, TagCheckOutcome, TagStatus, DEFAULT_CONCURRENCY,
};
use cratehub_core::validate::{run_structural, StructuralOutcome, ValidationReport};
use cratehub_core::{index, validate};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "cratehub",
    about = "Registry tooling for versioned container-command manifests",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Validate manifest structure, optionally verifying image tags
    /// against their registries
    Validate {
        /// Registry root directory
        #[clap(default_value = ".")]
        root: PathBuf,

        /// Also verify that image tags exist on their registries
        #[clap(long)]
        check_tags: bool,

        /// Output results as JSON
        #[clap(long)]
        json: bool,

        /// Concurrent registry checks
        #[clap(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Per-check timeout in seconds
        #[clap(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Sort each manifest's commands alphabetically in place
    Sort {
        /// Registry root directory
        #[clap(default_value = ".")]
        root: PathBuf,
    },

    /// Migrate bare-name manifest files to symlinks pointing at the
    /// latest versioned file
    Migrate {
        /// Registry root directory
        #[clap(default_value = ".")]
        root: PathBuf,

        /// Plan and log every action without touching the filesystem
        #[clap(long)]
        dry_run: bool,
    },

    /// Write the machine-readable manifest index (index.yaml, index.json)
    Index {
        /// Registry root directory
        #[clap(default_value = ".")]
        root: PathBuf,

        /// Output directory
        #[clap(long, default_value = "docs")]
        out: PathBuf,
    },
}

/// Configure logging from the CLI flag. Logs go to stderr, never stdout.
fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::new(log_level.to_filter_directive());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    match cli.command {
        Command::Validate {
            root,
            check_tags,
            json,
            concurrency,
            timeout,
        } => {
            validate_command(root, check_tags, json, concurrency, timeout).await
        }
        Command::Sort { root } => sort_command(root),
        Command::Migrate { root, dry_run } => migrate_command(root, dry_run),
        Command::Index { root, out } => index_command(root, out),
    }
}

async fn validate_command(
    root: PathBuf,
    check_tags: bool,
    json: bool,
    concurrency: usize,
    timeout: u64,
) -> Result<()> {
    let config = ScanConfig::new(root);
    let outcome = run_structural(&config)?;
    if !json {
        println!("Validating {} manifests...", outcome.reports.len());
    }

    let tag_results = if check_tags {
        let checker = RegistryChecker::new(concurrency, Duration::from_secs(timeout))?;
        Some(checker.check_all(&outcome.images).await)
    } else {
        None
    };

    if json {
        print_json_report(&outcome, tag_results.as_ref())?;
    } else {
        for report in &outcome.reports {
            print_report(report);
        }
        if let Some(results) = &tag_results {
            print_tag_results(results);
        }
    }

    let tag_errors = tag_results
        .as_ref()
        .map(|r| summarize(r).not_found)
        .unwrap_or(0);
    let failed = outcome.reports.len() - outcome.passed_count();
    if !json {
        println!(
            "\nValidation complete: {} passed, {} errors, {} warnings",
            outcome.passed_count(),
            failed + tag_errors,
            outcome.total_warnings
        );
    }

    if outcome.total_errors + tag_errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    println!("\n{}", report.path);
    for diag in &report.infos {
        println!("  OK    {}", diag.message);
    }
    for diag in &report.warnings {
        println!("  WARN  {}", diag.message);
    }
    for diag in &report.errors {
        println!("  ERROR {}", diag.message);
    }
}

fn print_tag_results(results: &BTreeMap<String, TagCheckOutcome>) {
    let summary = summarize(results);
    println!("\nImage tag verification:");
    println!(
        "  {} verified, {} not found, {} skipped",
        summary.verified, summary.not_found, summary.skipped
    );

    let missing: Vec<&TagCheckOutcome> = results
        .values()
        .filter(|o| o.status == TagStatus::NotFound)
        .collect();
    if !missing.is_empty() {
        println!("\n  Missing image tags:");
        for outcome in missing {
            println!("    ERROR {}: {}", outcome.image, outcome.message);
        }
    }
}

fn print_json_report(
    outcome: &StructuralOutcome,
    tag_results: Option<&BTreeMap<String, TagCheckOutcome>>,
) -> Result<()> {
    let diag_list = |diags: &[validate::Diagnostic]| {
        diags
            .iter()
            .map(|d| d.message.clone())
            .collect::<Vec<_>>()
    };
    let mut output = serde_json::json!({
        "total_files": outcome.reports.len(),
        "total_errors": outcome.total_errors,
        "total_warnings": outcome.total_warnings,
        "manifests": outcome.reports.iter().map(|r| {
            serde_json::json!({
                "path": r.path,
                "passing": r.passing(),
                "errors": diag_list(&r.errors),
                "warnings": diag_list(&r.warnings),
                "infos": diag_list(&r.infos),
            })
        }).collect::<Vec<_>>(),
    });
    if let Some(results) = tag_results {
        let summary = summarize(results);
        output["image_tags"] = serde_json::json!({
            "verified": summary.verified,
            "not_found": summary.not_found,
            "skipped": summary.skipped,
            "results": results.values().map(|o| {
                serde_json::json!({
                    "image": o.image,
                    "status": match o.status {
                        TagStatus::Verified => "verified",
                        TagStatus::NotFound => "not-found",
                        TagStatus::Skipped => "skipped",
                    },
                    "message": o.message,
                })
            }).collect::<Vec<_>>(),
        });
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn sort_command(root: PathBuf) -> Result<()> {
    let config = ScanConfig::new(root);
    let files = discover_manifest_files(&config)?;
    println!("Sorting commands in {} manifests...", files.len());

    let mut sorted_count = 0;
    for path in &files {
        if let SortOutcome::Sorted(commands) = sort_file(path)? {
            let rel = path.strip_prefix(&config.root).unwrap_or(path);
            println!("  Sorted {} ({} commands)", rel.display(), commands);
            sorted_count += 1;
        }
    }
    println!("\nSorted {sorted_count} manifests.");
    Ok(())
}

fn migrate_command(root: PathBuf, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("DRY RUN -- no changes will be made\n");
    }

    let config = ScanConfig::new(root);
    let plans = migrate::plan_root(&config)?;

    let mut hard_failures = 0;
    for plan in &plans {
        println!("Namespace: {}/", plan.namespace);
        for link in &plan.skipped_symlinks {
            let name = link.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            println!("  SKIP (already symlink): {name}");
        }
        for krate in &plan.crates {
            for action in &krate.actions {
                println!("  {action}");
            }
        }
        for (name, reason) in &plan.failures {
            println!("  ERROR {name}: {reason}");
            hard_failures += 1;
        }
        if !dry_run {
            let applied = migrate::apply_namespace(plan);
            info!("Applied {} mutations in {}", applied, plan.namespace);
        }
        println!();
    }

    println!("{}", if dry_run { "Dry run complete." } else { "Done." });
    if hard_failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn index_command(root: PathBuf, out: PathBuf) -> Result<()> {
    let config = ScanConfig::new(root);
    let records = load_records(&config)?;
    std::fs::create_dir_all(&out)?;

    let yaml_path = out.join("index.yaml");
    index::write_index_yaml(&records, &yaml_path)?;
    println!("  Wrote {}", yaml_path.display());

    let json_path = out.join("index.json");
    index::write_index_json(&records, &json_path)?;
    println!("  Wrote {}", json_path.display());
    Ok(())
}
