use crate::archive::unpack;
use crate::layout::{BundleLayout, APP_ENTRY, ENV_ENTRY};
use crate::manifest::BundleManifest;
use crate::BundleError;
use std::fs;
use std::path::Path;
use stevedore_types::AppDescriptor;
use tempfile::TempDir;
use tracing::{debug, warn};

/// A fully extracted and validated bundle.
///
/// Construction reads the descriptor and environment, validates resource
/// names, and verifies payload checksums when a manifest is present, so every
/// content error surfaces before a single remote call is issued.
#[derive(Debug)]
pub struct UnpackedBundle {
    // Keeps the scratch directory alive for bundles extracted from an archive.
    _scratch: Option<TempDir>,
    layout: BundleLayout,
    descriptor: AppDescriptor,
    env: Option<String>,
    has_build: bool,
    resources: Vec<String>,
    manifest: Option<BundleManifest>,
}

impl UnpackedBundle {
    /// Extract `archive` into a private scratch directory and validate it.
    pub fn from_archive(archive: &[u8]) -> Result<Self, BundleError> {
        let scratch = tempfile::tempdir()?;
        unpack(archive, scratch.path())?;
        let root = scratch.path().to_path_buf();
        Self::load(&root, Some(scratch))
    }

    /// Validate an already-extracted bundle directory.
    pub fn open(root: &Path) -> Result<Self, BundleError> {
        Self::load(root, None)
    }

    fn load(root: &Path, scratch: Option<TempDir>) -> Result<Self, BundleError> {
        let layout = BundleLayout::new(root);

        let app_path = layout.app_file();
        if !app_path.exists() {
            return Err(BundleError::MissingEntry(APP_ENTRY.to_owned()));
        }
        let descriptor: AppDescriptor = serde_json::from_slice(&fs::read(&app_path)?)
            .map_err(|e| BundleError::InvalidDescriptor(e.to_string()))?;

        let env_path = layout.env_file();
        let env = if env_path.exists() {
            let bytes = fs::read(&env_path)?;
            let blob = String::from_utf8(bytes)
                .map_err(|e| BundleError::decode(ENV_ENTRY, format!("not UTF-8: {e}")))?;
            Some(blob)
        } else {
            None
        };

        let has_build = layout.build_file().exists();
        let resources = layout.resource_names()?;

        let manifest_path = layout.manifest_file();
        let manifest = if manifest_path.exists() {
            let manifest = BundleManifest::load(&manifest_path)?;
            manifest.verify(&layout)?;
            Some(manifest)
        } else {
            warn!("bundle has no integrity manifest; payload checksums not verified");
            None
        };

        debug!(
            "opened bundle for {} (build: {has_build}, env: {}, resources: {})",
            descriptor.name,
            env.is_some(),
            resources.len()
        );

        Ok(Self {
            _scratch: scratch,
            layout,
            descriptor,
            env,
            has_build,
            resources,
            manifest,
        })
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    pub fn descriptor(&self) -> &AppDescriptor {
        &self.descriptor
    }

    /// Raw environment blob, exactly as exported.
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    pub fn has_build(&self) -> bool {
        self.has_build
    }

    pub fn open_build(&self) -> Result<fs::File, BundleError> {
        Ok(fs::File::open(self.layout.build_file())?)
    }

    /// Resource names in import order.
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn open_resource(&self, name: &str) -> Result<fs::File, BundleError> {
        if !self.resources.iter().any(|r| r == name) {
            return Err(BundleError::MissingEntry(BundleLayout::resource_entry(name)));
        }
        Ok(fs::File::open(self.layout.resource_file(name))?)
    }

    pub fn manifest(&self) -> Option<&BundleManifest> {
        self.manifest.as_ref()
    }
}
