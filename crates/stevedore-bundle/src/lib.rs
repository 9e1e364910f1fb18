//! Portable application bundles for the stevedore migration pipeline.
//!
//! This crate provides the archive codec (`pack`/`unpack`, a deterministic
//! gzip-compressed tar), the `BundleLayout` naming every entry inside a
//! bundle, the `BundleManifest` carrying payload checksums, and
//! `UnpackedBundle`, a validated view over an extracted bundle that import
//! reads from.

pub mod archive;
pub mod layout;
pub mod manifest;
pub mod unpacked;

pub use archive::{pack, pack_to_file, unpack};
pub use layout::{BundleLayout, BUNDLE_FORMAT_VERSION};
pub use manifest::{hash_file, BundleManifest};
pub use unpacked::UnpackedBundle;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed bundle entry '{path}': {reason}")]
    Decode { path: String, reason: String },
    #[error("bundle is missing required entry '{0}'")]
    MissingEntry(String),
    #[error("invalid application descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("invalid bundle content: {0}")]
    Validation(#[from] stevedore_types::ValidationError),
    #[error("integrity check failed for '{entry}': expected {expected}, got {actual}")]
    IntegrityFailure {
        entry: String,
        expected: String,
        actual: String,
    },
    #[error("unsupported bundle format version {found} (supported: {supported})")]
    UnsupportedFormat { found: u32, supported: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BundleError {
    pub(crate) fn decode(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        BundleError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
