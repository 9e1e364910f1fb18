//! Migration orchestration for stevedore.
//!
//! This crate drives the control plane through the export and import
//! pipelines. `Exporter` snapshots an application into a bundle; `Importer`
//! executes the ordered stage plan from `plan_import` against a target. Both
//! share the `StatusPoller`, which waits out transitional statuses on an
//! injected `Clock`, and `diff_parameters`, which narrows parameter updates
//! to what actually changed.

pub mod export;
pub mod import;
pub mod params;
pub mod plan;
pub mod poll;

pub use export::{ExportReport, ExportedResource, Exporter};
pub use import::{ImportFailure, ImportReport, Importer, StageOutcome, StageRecord};
pub use params::diff_parameters;
pub use plan::{plan_import, BundleSummary, PlannedStage, SkipReason, Stage};
pub use poll::{
    Clock, PollOptions, Settled, StatusPoller, SystemClock, VirtualClock, MIN_POLL_INTERVAL,
};

use std::time::Duration;
use stevedore_types::AppStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("bundle error: {0}")]
    Bundle(#[from] stevedore_bundle::BundleError),
    #[error("remote error: {0}")]
    Remote(#[from] stevedore_remote::RemoteError),
    #[error("application not found: {0}")]
    AppNotFound(String),
    #[error("application already exists: {0}")]
    AppExists(String),
    #[error(
        "timed out after {waited:?} waiting for {app} to settle (last status: {})",
        .last_status.as_ref().map_or("none", AppStatus::as_str)
    )]
    Timeout {
        app: String,
        waited: Duration,
        last_status: Option<AppStatus>,
    },
    #[error("{stage}: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<CoreError>,
    },
    #[error("invalid import plan: {0}")]
    InvalidPlan(String),
    #[error("{0}")]
    Import(Box<ImportFailure>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// The innermost error, with stage labels and import context stripped.
    pub fn root_cause(&self) -> &CoreError {
        match self {
            CoreError::Stage { source, .. } => source.root_cause(),
            CoreError::Import(failure) => failure.error.root_cause(),
            other => other,
        }
    }
}

impl From<ImportFailure> for CoreError {
    fn from(failure: ImportFailure) -> Self {
        CoreError::Import(Box::new(failure))
    }
}

/// Tag a failing step with the stage label it ran under.
pub(crate) trait StageContext<T> {
    fn stage(self, label: impl Into<String>) -> Result<T, CoreError>;
}

impl<T, E: Into<CoreError>> StageContext<T> for Result<T, E> {
    fn stage(self, label: impl Into<String>) -> Result<T, CoreError> {
        self.map_err(|e| CoreError::Stage {
            stage: label.into(),
            source: Box::new(e.into()),
        })
    }
}
