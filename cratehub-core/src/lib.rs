//! cratehub core - registry of versioned container-command manifests.
//!
//! The registry organizes namespaces of crates, each crate a set of
//! tagged YAML manifests binding command names to container images. This
//! crate owns the version ordering that decides which tag is "latest",
//! the on-disk symlink migration that canonicalizes crate layouts, and
//! the two-tier validation pipeline (structural checks, then concurrent
//! registry existence checks).

pub mod index;
pub mod manifest;
pub mod migrate;
pub mod repo;
pub mod sort;
pub mod validate;
pub mod version;
