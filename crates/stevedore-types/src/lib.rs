//! Data model for the stevedore application migration pipeline.
//!
//! This crate defines what the pipeline moves around: applications and their
//! status (`App`, `AppStatus`), the portable `AppDescriptor` stored in bundles,
//! releases, builds, bound resources, environment blobs, and the option structs
//! passed to control-plane mutations.

pub mod app;
pub mod env;
pub mod release;
pub mod resource;
pub mod types;

pub use app::{App, AppCreateOptions, AppDescriptor, AppStatus, AppUpdateOptions, Parameters};
pub use env::Environment;
pub use release::{Build, Release, ReleaseCreateOptions};
pub use resource::{validate_resource_name, Resource};
pub use types::{BuildId, ReleaseId};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid resource name '{name}': {reason}")]
    InvalidResourceName { name: String, reason: String },
}
