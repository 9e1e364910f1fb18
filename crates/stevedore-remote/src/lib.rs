//! Control-plane access for the stevedore migration pipeline.
//!
//! This crate defines `ControlPlane`, the narrow capability interface the
//! export and import orchestrators are built on, together with an HTTP
//! adapter (`HttpControlPlane`), endpoint configuration (`RemoteConfig`), and a
//! scriptable in-memory implementation (`MockControlPlane`) for tests.

pub mod config;
pub mod http;
pub mod mock;

pub use config::RemoteConfig;
pub use http::HttpControlPlane;
pub use mock::{Call, MockControlPlane, Observation, Op};

use std::io::{Read, Write};
use stevedore_types::{
    App, AppCreateOptions, AppUpdateOptions, Build, Release, ReleaseCreateOptions, Resource,
};

/// Protocol version sent as `X-Stevedore-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("remote config error: {0}")]
    Config(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Remote operations the pipeline may issue against a control plane.
///
/// Every call is synchronous from the caller's point of view. Implementations
/// report a missing application, release, or resource as
/// [`RemoteError::NotFound`].
pub trait ControlPlane: Send + Sync {
    fn app_create(&self, name: &str, opts: &AppCreateOptions) -> Result<App, RemoteError>;

    fn app_get(&self, name: &str) -> Result<App, RemoteError>;

    fn app_update(&self, name: &str, opts: &AppUpdateOptions) -> Result<(), RemoteError>;

    /// Upload a build artifact, yielding a new build.
    fn build_import(&self, app: &str, source: &mut dyn Read) -> Result<Build, RemoteError>;

    /// Stream the artifact of `build_id` into `dest`.
    fn build_export(
        &self,
        app: &str,
        build_id: &str,
        dest: &mut dyn Write,
    ) -> Result<(), RemoteError>;

    fn release_get(&self, app: &str, release_id: &str) -> Result<Release, RemoteError>;

    fn release_create(
        &self,
        app: &str,
        opts: &ReleaseCreateOptions,
    ) -> Result<Release, RemoteError>;

    fn release_promote(&self, app: &str, release_id: &str) -> Result<(), RemoteError>;

    fn resource_list(&self, app: &str) -> Result<Vec<Resource>, RemoteError>;

    fn resource_export(&self, app: &str, name: &str) -> Result<Box<dyn Read>, RemoteError>;

    fn resource_import(
        &self,
        app: &str,
        name: &str,
        source: &mut dyn Read,
    ) -> Result<(), RemoteError>;
}
