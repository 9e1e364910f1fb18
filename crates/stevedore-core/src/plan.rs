use serde::Serialize;
use std::fmt;
use stevedore_bundle::UnpackedBundle;

/// One step of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CreateApp,
    AwaitReady,
    ImportBuild,
    CreateRelease,
    PromoteRelease,
    ImportResource(String),
    /// Placeholder for the resource stages of a bundle that has none.
    ImportResources,
    UpdateParameters,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CreateApp => f.write_str("create app"),
            Stage::AwaitReady => f.write_str("await ready"),
            Stage::ImportBuild => f.write_str("import build"),
            Stage::CreateRelease => f.write_str("create release"),
            Stage::PromoteRelease => f.write_str("promote release"),
            Stage::ImportResource(name) => write!(f, "import resource {name}"),
            Stage::ImportResources => f.write_str("import resources"),
            Stage::UpdateParameters => f.write_str("update parameters"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoBuild,
    NoBuildOrEnvironment,
    NoRelease,
    NoResources,
    NoParameters,
    /// Decided at run time: the target already carries every parameter.
    ParametersUnchanged,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NoBuild => "bundle has no build",
            SkipReason::NoBuildOrEnvironment => "bundle has neither build nor environment",
            SkipReason::NoRelease => "no release was created",
            SkipReason::NoResources => "bundle has no resources",
            SkipReason::NoParameters => "bundle has no parameters",
            SkipReason::ParametersUnchanged => "parameters already match",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStage {
    pub stage: Stage,
    pub skip: Option<SkipReason>,
}

impl PlannedStage {
    fn run(stage: Stage) -> Self {
        Self { stage, skip: None }
    }

    fn skip_if(stage: Stage, condition: bool, reason: SkipReason) -> Self {
        Self {
            stage,
            skip: condition.then_some(reason),
        }
    }
}

/// What a bundle contains, as far as planning is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleSummary {
    pub has_build: bool,
    pub has_env: bool,
    /// Resource names in import order.
    pub resources: Vec<String>,
    pub has_parameters: bool,
}

impl BundleSummary {
    pub fn of(bundle: &UnpackedBundle) -> Self {
        Self {
            has_build: bundle.has_build(),
            has_env: bundle.env().is_some(),
            resources: bundle.resources().to_vec(),
            has_parameters: !bundle.descriptor().parameters.is_empty(),
        }
    }
}

/// Ordered import stages for a bundle, with static skips resolved.
pub fn plan_import(summary: &BundleSummary) -> Vec<PlannedStage> {
    let no_release = !summary.has_build && !summary.has_env;
    let no_resources = summary.resources.is_empty();

    let mut plan = vec![
        PlannedStage::run(Stage::CreateApp),
        PlannedStage::run(Stage::AwaitReady),
        PlannedStage::skip_if(Stage::ImportBuild, !summary.has_build, SkipReason::NoBuild),
        PlannedStage::skip_if(
            Stage::CreateRelease,
            no_release,
            SkipReason::NoBuildOrEnvironment,
        ),
        PlannedStage::skip_if(Stage::PromoteRelease, no_release, SkipReason::NoRelease),
        PlannedStage::skip_if(Stage::AwaitReady, no_release, SkipReason::NoRelease),
    ];

    if no_resources {
        plan.push(PlannedStage::skip_if(
            Stage::ImportResources,
            true,
            SkipReason::NoResources,
        ));
    } else {
        plan.extend(
            summary
                .resources
                .iter()
                .map(|name| PlannedStage::run(Stage::ImportResource(name.clone()))),
        );
    }
    plan.push(PlannedStage::skip_if(
        Stage::AwaitReady,
        no_resources,
        SkipReason::NoResources,
    ));
    plan.push(PlannedStage::skip_if(
        Stage::UpdateParameters,
        !summary.has_parameters,
        SkipReason::NoParameters,
    ));
    plan
}
