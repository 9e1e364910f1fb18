use crate::{CoreError, StageContext};
use serde::Serialize;
use std::fs;
use std::path::Path;
use stevedore_bundle::{pack, pack_to_file, BundleError, BundleLayout, BundleManifest};
use stevedore_remote::ControlPlane;
use stevedore_types::{validate_resource_name, App, BuildId, ReleaseId};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedResource {
    pub name: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub app: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildId>,
    pub env: bool,
    pub resources: Vec<ExportedResource>,
    pub archive_bytes: u64,
}

/// Snapshots an application into a bundle. Only reads from the control plane.
pub struct Exporter<'a> {
    plane: &'a dyn ControlPlane,
}

impl<'a> Exporter<'a> {
    pub fn new(plane: &'a dyn ControlPlane) -> Self {
        Self { plane }
    }

    /// Export `app` and return the packed bundle.
    pub fn export(&self, app: &str) -> Result<(Vec<u8>, ExportReport), CoreError> {
        let staging = tempfile::tempdir()?;
        let mut report = self.stage(app, staging.path())?;
        let archive = pack(staging.path()).stage("package")?;
        report.archive_bytes = archive.len() as u64;
        info!("exported {app} ({} bytes)", report.archive_bytes);
        Ok((archive, report))
    }

    /// Export `app` to `dest`. The file only appears once the whole export
    /// has succeeded.
    pub fn export_to_file(&self, app: &str, dest: &Path) -> Result<ExportReport, CoreError> {
        let staging = tempfile::tempdir()?;
        let mut report = self.stage(app, staging.path())?;
        report.archive_bytes = pack_to_file(staging.path(), dest).stage("package")?;
        info!(
            "exported {app} to {} ({} bytes)",
            dest.display(),
            report.archive_bytes
        );
        Ok(report)
    }

    /// Write every bundle entry for `app` into the directory `root`.
    pub fn stage(&self, app: &str, root: &Path) -> Result<ExportReport, CoreError> {
        let layout = BundleLayout::new(root);
        layout.initialize().stage("package")?;

        info!("export {app}: app");
        let found = self.fetch_app(app)?;
        let mut report = ExportReport {
            app: app.to_owned(),
            ..ExportReport::default()
        };

        if let Some(release_id) = found.active_release() {
            info!("export {app}: release {release_id}");
            let release = self
                .plane
                .release_get(app, &release_id)
                .stage("release")?;
            fs::write(layout.env_file(), release.env.as_bytes()).stage("release")?;
            report.env = true;
            report.build = release.build;
            report.release = Some(release_id);
        } else {
            debug!("export {app}: no active release");
        }

        if let Some(ref build_id) = report.build {
            let label = format!("build {build_id}");
            info!("export {app}: {label}");
            let mut file = fs::File::create(layout.build_file()).stage(label.as_str())?;
            self.plane
                .build_export(app, build_id, &mut file)
                .stage(label.as_str())?;
            file.sync_all().stage(label.as_str())?;
        }

        let resources = self.plane.resource_list(app).stage("resources")?;
        for resource in resources {
            let label = format!("resource {}", resource.name);
            info!("export {app}: {label}");
            validate_resource_name(&resource.name)
                .map_err(BundleError::from)
                .stage(label.as_str())?;
            let mut source = self
                .plane
                .resource_export(app, &resource.name)
                .stage(label.as_str())?;
            let mut file =
                fs::File::create(layout.resource_file(&resource.name)).stage(label.as_str())?;
            let bytes = std::io::copy(&mut source, &mut file).stage(label.as_str())?;
            file.sync_all().stage(label.as_str())?;
            report.resources.push(ExportedResource {
                name: resource.name,
                bytes,
            });
        }

        let descriptor = serde_json::to_vec_pretty(&found.descriptor()).stage("app")?;
        fs::write(layout.app_file(), descriptor).stage("app")?;

        BundleManifest::compute(&layout, app)
            .and_then(|m| m.save(&layout.manifest_file()))
            .stage("package")?;

        Ok(report)
    }

    fn fetch_app(&self, app: &str) -> Result<App, CoreError> {
        match self.plane.app_get(app) {
            Ok(found) => Ok(found),
            Err(e) if e.is_not_found() => Err(CoreError::AppNotFound(app.to_owned())),
            Err(e) => Err(e).stage("app"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_remote::{MockControlPlane, Op, RemoteError};
    use stevedore_types::{AppStatus, Build, Release, Resource};

    fn source_plane() -> MockControlPlane {
        let plane = MockControlPlane::new();
        plane.insert_app(App {
            generation: "2".to_owned(),
            name: "app1".to_owned(),
            release: "release1".to_owned(),
            status: AppStatus::Running,
            ..App::default()
        });
        plane.insert_release(Release {
            id: ReleaseId::new("release1"),
            app: "app1".to_owned(),
            build: Some(BuildId::new("build1")),
            env: "FOO=bar\nBAZ=quux".to_owned(),
            created: String::new(),
        });
        plane.insert_build(
            Build {
                id: BuildId::new("build1"),
                app: "app1".to_owned(),
                status: "complete".to_owned(),
                release: None,
                description: None,
            },
            b"build",
        );
        plane
    }

    #[test]
    fn missing_app_fails_fast() {
        let plane = MockControlPlane::new();
        let err = Exporter::new(&plane).export("ghost").unwrap_err();
        assert!(matches!(err, CoreError::AppNotFound(ref a) if a == "ghost"));
        assert_eq!(plane.ops(), vec![Op::AppGet]);
    }

    #[test]
    fn app_without_release_exports_descriptor_only() {
        let plane = MockControlPlane::new();
        plane.insert_app(App {
            name: "app1".to_owned(),
            ..App::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let report = Exporter::new(&plane).stage("app1", dir.path()).unwrap();

        let layout = BundleLayout::new(dir.path());
        assert!(layout.app_file().exists());
        assert!(!layout.env_file().exists());
        assert!(!layout.build_file().exists());
        assert!(!report.env);
        assert!(plane.calls_of(Op::BuildExport).is_empty());
    }

    #[test]
    fn descriptor_omits_status() {
        let plane = source_plane();
        let dir = tempfile::tempdir().unwrap();
        Exporter::new(&plane).stage("app1", dir.path()).unwrap();

        let json = fs::read_to_string(BundleLayout::new(dir.path()).app_file()).unwrap();
        assert!(!json.contains("status"));
        assert!(json.contains("\"generation\": \"2\""));
    }

    #[test]
    fn build_failure_is_labelled() {
        let plane = source_plane();
        plane.fail(Op::BuildExport);
        let err = Exporter::new(&plane).export("app1").unwrap_err();
        match err {
            CoreError::Stage { stage, source } => {
                assert_eq!(stage, "build build1");
                assert!(matches!(*source, CoreError::Remote(RemoteError::Http(_))));
            }
            other => panic!("expected stage error, got {other:?}"),
        }
    }

    #[test]
    fn failed_export_leaves_no_file() {
        let plane = source_plane();
        plane.insert_resource(
            "app1",
            Resource {
                name: "resource1".to_owned(),
                kind: "postgres".to_owned(),
            },
            b"resourcedata\n",
        );
        plane.fail_for(Op::ResourceExport, "resource1");

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("app1.tgz");
        let err = Exporter::new(&plane)
            .export_to_file("app1", &dest)
            .unwrap_err();
        assert!(matches!(err, CoreError::Stage { ref stage, .. } if stage == "resource resource1"));
        assert!(!dest.exists());
    }

    #[test]
    fn unsafe_resource_name_rejected() {
        let plane = source_plane();
        plane.insert_resource(
            "app1",
            Resource {
                name: "../escape".to_owned(),
                kind: "postgres".to_owned(),
            },
            b"x",
        );
        let err = Exporter::new(&plane).export("app1").unwrap_err();
        assert!(matches!(
            err.root_cause(),
            CoreError::Bundle(BundleError::Validation(_))
        ));
        assert!(plane.calls_of(Op::ResourceExport).is_empty());
    }
}
