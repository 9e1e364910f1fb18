use crate::BundleError;
use std::fs;
use std::path::{Path, PathBuf};
use stevedore_types::validate_resource_name;
use tracing::warn;

/// Current bundle format version, recorded in `bundle.json`. Incremented on
/// incompatible entry layout changes.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

pub const APP_ENTRY: &str = "app.json";
pub const ENV_ENTRY: &str = "env";
pub const BUILD_ENTRY: &str = "build.tgz";
pub const MANIFEST_ENTRY: &str = "bundle.json";
pub const RESOURCES_DIR: &str = "resources";
const RESOURCE_SUFFIX: &str = ".export";

/// Entry layout of a bundle directory, before packing or after unpacking.
///
/// ```text
/// app.json                  application descriptor (required)
/// env                       environment blob of the active release
/// build.tgz                 build payload
/// resources/<name>.export   one payload per bound resource
/// bundle.json               format version and payload checksums
/// ```
#[derive(Debug, Clone)]
pub struct BundleLayout {
    root: PathBuf,
}

impl BundleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn app_file(&self) -> PathBuf {
        self.root.join(APP_ENTRY)
    }

    #[inline]
    pub fn env_file(&self) -> PathBuf {
        self.root.join(ENV_ENTRY)
    }

    #[inline]
    pub fn build_file(&self) -> PathBuf {
        self.root.join(BUILD_ENTRY)
    }

    #[inline]
    pub fn manifest_file(&self) -> PathBuf {
        self.root.join(MANIFEST_ENTRY)
    }

    #[inline]
    pub fn resources_dir(&self) -> PathBuf {
        self.root.join(RESOURCES_DIR)
    }

    /// Path of a resource payload. The name must already be validated.
    #[inline]
    pub fn resource_file(&self, name: &str) -> PathBuf {
        self.resources_dir().join(format!("{name}{RESOURCE_SUFFIX}"))
    }

    /// Archive entry name of a resource payload, as used in errors and manifests.
    pub fn resource_entry(name: &str) -> String {
        format!("{RESOURCES_DIR}/{name}{RESOURCE_SUFFIX}")
    }

    pub fn initialize(&self) -> Result<(), BundleError> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.resources_dir())?;
        Ok(())
    }

    /// Names of all resource payloads present, sorted.
    ///
    /// Files without the `.export` suffix are ignored with a warning; names
    /// that fail validation are rejected.
    pub fn resource_names(&self) -> Result<Vec<String>, BundleError> {
        let dir = self.resources_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_file() {
                warn!("ignoring non-file bundle entry {RESOURCES_DIR}/{file_name}");
                continue;
            }
            let Some(name) = file_name.strip_suffix(RESOURCE_SUFFIX) else {
                warn!("ignoring unexpected bundle entry {RESOURCES_DIR}/{file_name}");
                continue;
            };
            validate_resource_name(name)?;
            names.push(name.to_owned());
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_paths() {
        let layout = BundleLayout::new("/tmp/bundle");
        assert_eq!(layout.app_file(), PathBuf::from("/tmp/bundle/app.json"));
        assert_eq!(layout.env_file(), PathBuf::from("/tmp/bundle/env"));
        assert_eq!(layout.build_file(), PathBuf::from("/tmp/bundle/build.tgz"));
        assert_eq!(
            layout.resource_file("resource1"),
            PathBuf::from("/tmp/bundle/resources/resource1.export")
        );
        assert_eq!(
            BundleLayout::resource_entry("resource1"),
            "resources/resource1.export"
        );
    }

    #[test]
    fn initialize_creates_resources_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path().join("b"));
        layout.initialize().unwrap();
        assert!(layout.resources_dir().is_dir());
    }

    #[test]
    fn resource_names_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(layout.resource_file("zeta"), "z").unwrap();
        fs::write(layout.resource_file("alpha"), "a").unwrap();
        fs::write(layout.resources_dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(layout.resource_names().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn resource_names_without_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        assert!(layout.resource_names().unwrap().is_empty());
    }

    #[test]
    fn invalid_resource_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(layout.resources_dir().join(".export"), "x").unwrap();
        assert!(matches!(
            layout.resource_names(),
            Err(BundleError::Validation(_))
        ));
    }
}
