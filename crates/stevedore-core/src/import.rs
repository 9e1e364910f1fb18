use crate::params::diff_parameters;
use crate::plan::{plan_import, BundleSummary, PlannedStage, SkipReason, Stage};
use crate::poll::{Clock, PollOptions, Settled, StatusPoller};
use crate::CoreError;
use serde::Serialize;
use std::path::Path;
use stevedore_bundle::UnpackedBundle;
use stevedore_remote::{ControlPlane, RemoteError};
use stevedore_types::{
    AppCreateOptions, AppStatus, AppUpdateOptions, BuildId, ReleaseCreateOptions, ReleaseId,
};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

/// Stages an import went through, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub app: String,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseId>,
    /// Parameter keys sent to the target.
    pub updated_parameters: Vec<String>,
}

impl ImportReport {
    pub fn completed(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|r| r.outcome == StageOutcome::Completed)
            .map(|r| &r.stage)
    }

    fn record(&mut self, stage: &Stage, outcome: StageOutcome) {
        self.stages.push(StageRecord {
            stage: stage.clone(),
            outcome,
        });
    }
}

/// An import that stopped at `stage`. Nothing is rolled back: `report`
/// lists what had already been applied to the target.
#[derive(Debug, thiserror::Error)]
#[error("import of {} failed at stage '{stage}': {error}", .report.app)]
pub struct ImportFailure {
    pub report: ImportReport,
    pub stage: Stage,
    #[source]
    pub error: CoreError,
}

/// Reconstitutes an application from a bundle by executing the import plan.
pub struct Importer<'a> {
    plane: &'a dyn ControlPlane,
    clock: &'a dyn Clock,
    options: PollOptions,
}

impl<'a> Importer<'a> {
    pub fn new(plane: &'a dyn ControlPlane, clock: &'a dyn Clock, options: PollOptions) -> Self {
        Self {
            plane,
            clock,
            options,
        }
    }

    /// Unpack and verify `archive`, then import it as `target`.
    ///
    /// Every bundle content error is reported before the first remote call.
    pub fn import_archive(&self, archive: &[u8], target: &str) -> Result<ImportReport, CoreError> {
        let bundle = UnpackedBundle::from_archive(archive)?;
        Ok(self.import(&bundle, target)?)
    }

    pub fn import_file(&self, path: &Path, target: &str) -> Result<ImportReport, CoreError> {
        let archive = std::fs::read(path)?;
        self.import_archive(&archive, target)
    }

    /// Import a verified bundle following [`plan_import`].
    pub fn import(
        &self,
        bundle: &UnpackedBundle,
        target: &str,
    ) -> Result<ImportReport, ImportFailure> {
        let plan = plan_import(&BundleSummary::of(bundle));
        self.execute(bundle, target, &plan)
    }

    /// Run `plan` stage by stage, stopping at the first failure.
    pub fn execute(
        &self,
        bundle: &UnpackedBundle,
        target: &str,
        plan: &[PlannedStage],
    ) -> Result<ImportReport, ImportFailure> {
        let mut report = ImportReport {
            app: target.to_owned(),
            ..ImportReport::default()
        };

        for planned in plan {
            if let Some(reason) = planned.skip {
                info!("import {target}: {} skipped ({reason})", planned.stage);
                report.record(&planned.stage, StageOutcome::Skipped(reason));
                continue;
            }

            info!("import {target}: {}", planned.stage);
            match self.run_stage(bundle, target, &planned.stage, &mut report) {
                Ok(outcome) => {
                    if let StageOutcome::Skipped(reason) = outcome {
                        info!("import {target}: {} skipped ({reason})", planned.stage);
                    }
                    report.record(&planned.stage, outcome);
                }
                Err(error) => {
                    warn!("import {target}: {} failed: {error}", planned.stage);
                    return Err(ImportFailure {
                        report,
                        stage: planned.stage.clone(),
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    fn run_stage(
        &self,
        bundle: &UnpackedBundle,
        target: &str,
        stage: &Stage,
        report: &mut ImportReport,
    ) -> Result<StageOutcome, CoreError> {
        match stage {
            Stage::CreateApp => {
                self.create_app(bundle, target)?;
            }
            Stage::AwaitReady => self.await_ready(target)?,
            Stage::ImportBuild => {
                let mut payload = bundle.open_build()?;
                let build = self.plane.build_import(target, &mut payload)?;
                info!("import {target}: build {} created", build.id);
                report.build = Some(build.id);
            }
            Stage::CreateRelease => {
                let opts = ReleaseCreateOptions {
                    build: report.build.clone(),
                    env: bundle.env().map(str::to_owned),
                };
                let release = self.plane.release_create(target, &opts)?;
                info!("import {target}: release {} created", release.id);
                report.release = Some(release.id);
            }
            Stage::PromoteRelease => {
                let release = report.release.as_ref().ok_or_else(|| {
                    CoreError::InvalidPlan("promote scheduled without a release".to_owned())
                })?;
                self.plane.release_promote(target, release)?;
            }
            Stage::ImportResource(name) => {
                let mut payload = bundle.open_resource(name)?;
                self.plane.resource_import(target, name, &mut payload)?;
            }
            Stage::ImportResources => {
                return Err(CoreError::InvalidPlan(
                    "resource placeholder stage cannot run".to_owned(),
                ));
            }
            Stage::UpdateParameters => {
                let current = self.plane.app_get(target)?;
                let diff = diff_parameters(&bundle.descriptor().parameters, &current.parameters);
                if diff.is_empty() {
                    return Ok(StageOutcome::Skipped(SkipReason::ParametersUnchanged));
                }
                report.updated_parameters = diff.keys().cloned().collect();
                self.plane
                    .app_update(target, &AppUpdateOptions { parameters: diff })?;
            }
        }
        Ok(StageOutcome::Completed)
    }

    fn create_app(&self, bundle: &UnpackedBundle, target: &str) -> Result<(), CoreError> {
        match self.plane.app_get(target) {
            Ok(_) => return Err(CoreError::AppExists(target.to_owned())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        let opts = AppCreateOptions {
            generation: bundle.descriptor().generation().map(str::to_owned),
        };
        match self.plane.app_create(target, &opts) {
            Ok(_) => Ok(()),
            Err(RemoteError::Conflict(_)) => Err(CoreError::AppExists(target.to_owned())),
            Err(e) => Err(e.into()),
        }
    }

    fn await_ready(&self, target: &str) -> Result<(), CoreError> {
        let poller = StatusPoller::new(self.plane, self.clock, self.options);
        match poller.await_ready(target)? {
            Settled::Status(AppStatus::Running) => Ok(()),
            Settled::Status(status) => {
                warn!("import {target}: settled with status {status}");
                Ok(())
            }
            Settled::Gone => Err(CoreError::AppNotFound(target.to_owned())),
        }
    }
}
