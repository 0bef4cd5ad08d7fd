//! Validation pipeline, Tier 2: image tag existence checks against
//! public container registries.
//!
//! Registries are best-effort oracles. A check can only turn a passing
//! run into a failing one when a registry positively reports the tag
//! missing; timeouts, odd HTTP statuses, and unknown registry shapes are
//! all fail-open and count as skipped. Checks never retry.

use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::debug;

/// Worker pool width for concurrent checks.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Per-check timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const QUAY_API: &str = "https://quay.io/api/v1/repository";
const HUB_API: &str = "https://hub.docker.com/v2/repositories";

/// Outcome category for one image check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStatus {
    /// The registry confirmed the tag exists.
    Verified,
    /// The registry positively reported the tag missing. The only
    /// status that contributes to the run's error count.
    NotFound,
    /// Unverifiable for any reason; informational only.
    Skipped,
}

/// Result of checking one image, keyed by the original image string.
#[derive(Debug, Clone)]
pub struct TagCheckOutcome {
    pub image: String,
    pub status: TagStatus,
    pub message: String,
}

/// Aggregate tally for summary reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSummary {
    pub verified: usize,
    pub not_found: usize,
    pub skipped: usize,
}

/// Where a repository path routes, decided purely from its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RegistryKind {
    Quay { namespace: String, name: String },
    /// No public anonymous API; unverifiable by design.
    Ghcr,
    Hub { namespace: String, name: String },
    /// Official/library image on the default public hub.
    Library { name: String },
    UnknownRegistry,
    UnusualQuayPath,
}

fn classify_repository(repo_path: &str) -> RegistryKind {
    if let Some(repo) = repo_path.strip_prefix("quay.io/") {
        let segments: Vec<&str> = repo.split('/').collect();
        return match segments.as_slice() {
            [namespace, name] => RegistryKind::Quay {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            _ => RegistryKind::UnusualQuayPath,
        };
    }
    if repo_path.starts_with("ghcr.io/") {
        return RegistryKind::Ghcr;
    }
    let segments: Vec<&str> = repo_path.split('/').collect();
    match segments.as_slice() {
        [name] => RegistryKind::Library {
            name: name.to_string(),
        },
        [namespace, name] => RegistryKind::Hub {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        _ => RegistryKind::UnknownRegistry,
    }
}

#[derive(Debug, Deserialize)]
struct QuayTagPage {
    #[serde(default)]
    tags: Vec<serde_json::Value>,
}

/// Concurrent tag checker over a bounded pool of HTTP lookups.
pub struct RegistryChecker {
    client: Client,
    concurrency: usize,
}

impl RegistryChecker {
    pub fn new(concurrency: usize, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cratehub/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            concurrency: concurrency.max(1),
        })
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        Self::new(DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT)
    }

    /// Check every tagged image in the set, blocking until all checks
    /// have completed. Untagged images were already warned about in
    /// Tier 1 and are unverifiable, so they are excluded up front.
    /// Produces exactly one outcome per unique image.
    pub async fn check_all(&self, images: &BTreeSet<String>) -> BTreeMap<String, TagCheckOutcome> {
        let to_check: Vec<String> = images.iter().filter(|i| i.contains(':')).cloned().collect();
        let total = to_check.len();
        eprintln!("Checking {total} unique image tags on registries...");

        let mut results = BTreeMap::new();
        let mut pending = stream::iter(to_check)
            .map(|image| self.check_image_tag(image))
            .buffer_unordered(self.concurrency);

        let mut done = 0usize;
        while let Some(outcome) = pending.next().await {
            done += 1;
            if done % 10 == 0 {
                eprintln!("  Checked {done}/{total} images...");
            }
            results.insert(outcome.image.clone(), outcome);
        }
        results
    }

    /// Check whether one image's tag exists on its registry.
    pub async fn check_image_tag(&self, image: String) -> TagCheckOutcome {
        let trimmed = image.trim();
        let Some((repo_path, tag)) = trimmed.rsplit_once(':') else {
            return TagCheckOutcome {
                image,
                status: TagStatus::Skipped,
                message: "no tag (implicit :latest)".to_string(),
            };
        };

        let (status, message) = match classify_repository(repo_path) {
            RegistryKind::Quay { namespace, name } => {
                self.check_quay(&namespace, &name, tag).await
            }
            RegistryKind::Ghcr => (
                TagStatus::Skipped,
                "skipped (ghcr.io -- no public API)".to_string(),
            ),
            RegistryKind::Hub { namespace, name } => {
                self.check_hub(&namespace, &name, tag).await
            }
            RegistryKind::Library { name } => self.check_hub("library", &name, tag).await,
            RegistryKind::UnknownRegistry => (
                TagStatus::Skipped,
                "skipped (unknown registry)".to_string(),
            ),
            RegistryKind::UnusualQuayPath => (
                TagStatus::Skipped,
                "skipped (unusual quay.io path)".to_string(),
            ),
        };
        debug!("{image}: {message}");
        TagCheckOutcome {
            image,
            status,
            message,
        }
    }

    /// Query quay.io's tag listing filtered to the specific tag; a
    /// non-empty tag list means the tag exists.
    async fn check_quay(&self, namespace: &str, name: &str, tag: &str) -> (TagStatus, String) {
        let url = format!("{QUAY_API}/{namespace}/{name}/tag/?specificTag={tag}");
        let response = match self.client.get(&url).header("Accept", "application/json").send().await
        {
            Ok(r) => r,
            Err(e) => return (TagStatus::Skipped, format!("skipped (network error: {e})")),
        };
        match response.status() {
            StatusCode::OK => match response.json::<QuayTagPage>().await {
                Ok(page) if !page.tags.is_empty() => {
                    (TagStatus::Verified, "verified on quay.io".to_string())
                }
                Ok(_) => (TagStatus::NotFound, "tag not found on quay.io".to_string()),
                Err(e) => (TagStatus::Skipped, format!("skipped (network error: {e})")),
            },
            StatusCode::NOT_FOUND => {
                (TagStatus::NotFound, "tag not found (HTTP 404)".to_string())
            }
            other => (TagStatus::Skipped, format!("skipped (HTTP {})", other.as_u16())),
        }
    }

    /// Query the public hub's per-tag endpoint: 200 verified, 404
    /// missing, anything else fail-open.
    async fn check_hub(&self, namespace: &str, name: &str, tag: &str) -> (TagStatus, String) {
        let url = format!("{HUB_API}/{namespace}/{name}/tags/{tag}");
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return (TagStatus::Skipped, format!("skipped (network error: {e})")),
        };
        match response.status() {
            StatusCode::OK => (TagStatus::Verified, "verified on Docker Hub".to_string()),
            StatusCode::NOT_FOUND => {
                (TagStatus::NotFound, "tag not found (HTTP 404)".to_string())
            }
            other => (TagStatus::Skipped, format!("skipped (HTTP {})", other.as_u16())),
        }
    }
}

/// Merge outcomes into the verified / not-found / skipped tally.
pub fn summarize(results: &BTreeMap<String, TagCheckOutcome>) -> TagSummary {
    let mut summary = TagSummary::default();
    for outcome in results.values() {
        match outcome.status {
            TagStatus::Verified => summary.verified += 1,
            TagStatus::NotFound => summary.not_found += 1,
            TagStatus::Skipped => summary.skipped += 1,
        }
    }
    summary
}
