use crate::layout::{BundleLayout, BUILD_ENTRY, BUNDLE_FORMAT_VERSION};
use crate::{fsync_dir, BundleError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Integrity manifest stored as `bundle.json`.
///
/// Records the format version and a blake3 checksum for every opaque payload
/// so a damaged bundle is rejected before import touches the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub exported_at: String,
    pub source_app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, String>,
}

/// blake3 checksum of a file, streamed.
pub fn hash_file(path: &Path) -> Result<String, BundleError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

impl BundleManifest {
    /// Compute checksums for every payload currently present in `layout`.
    pub fn compute(layout: &BundleLayout, source_app: &str) -> Result<Self, BundleError> {
        let build_path = layout.build_file();
        let build = if build_path.exists() {
            Some(hash_file(&build_path)?)
        } else {
            None
        };

        let mut resources = BTreeMap::new();
        for name in layout.resource_names()? {
            let sum = hash_file(&layout.resource_file(&name))?;
            resources.insert(name, sum);
        }

        Ok(Self {
            format_version: BUNDLE_FORMAT_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            source_app: source_app.to_owned(),
            build,
            resources,
        })
    }

    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let content = fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| BundleError::decode(crate::layout::MANIFEST_ENTRY, e))?;
        if manifest.format_version > BUNDLE_FORMAT_VERSION {
            return Err(BundleError::UnsupportedFormat {
                found: manifest.format_version,
                supported: BUNDLE_FORMAT_VERSION,
            });
        }
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), BundleError> {
        let content = serde_json::to_string_pretty(self)?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| BundleError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    /// Check every payload in `layout` against the recorded checksums.
    ///
    /// A payload listed here but missing on disk, or present on disk but not
    /// listed, is an integrity failure as well.
    pub fn verify(&self, layout: &BundleLayout) -> Result<(), BundleError> {
        let build_path = layout.build_file();
        match (&self.build, build_path.exists()) {
            (Some(expected), true) => check(BUILD_ENTRY, expected, &hash_file(&build_path)?)?,
            (Some(_), false) => return Err(BundleError::MissingEntry(BUILD_ENTRY.to_owned())),
            (None, true) => {
                return Err(BundleError::IntegrityFailure {
                    entry: BUILD_ENTRY.to_owned(),
                    expected: "<absent>".to_owned(),
                    actual: hash_file(&build_path)?,
                })
            }
            (None, false) => {}
        }

        let present = layout.resource_names()?;
        for name in &present {
            let entry = BundleLayout::resource_entry(name);
            let actual = hash_file(&layout.resource_file(name))?;
            match self.resources.get(name) {
                Some(expected) => check(&entry, expected, &actual)?,
                None => {
                    return Err(BundleError::IntegrityFailure {
                        entry,
                        expected: "<absent>".to_owned(),
                        actual,
                    })
                }
            }
        }
        for name in self.resources.keys() {
            if !present.contains(name) {
                return Err(BundleError::MissingEntry(BundleLayout::resource_entry(name)));
            }
        }
        Ok(())
    }
}

fn check(entry: &str, expected: &str, actual: &str) -> Result<(), BundleError> {
    if expected == actual {
        Ok(())
    } else {
        Err(BundleError::IntegrityFailure {
            entry: entry.to_owned(),
            expected: expected.to_owned(),
            actual: actual.to_owned(),
        })
    }
}
