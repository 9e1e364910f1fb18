use crate::types::ReleaseId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration parameters of an application. Sorted for stable output.
pub type Parameters = BTreeMap<String, String>;

/// Status reported by the control plane for an application.
///
/// Unknown values are kept verbatim in `Other` and treated as terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppStatus {
    Creating,
    Running,
    Updating,
    Deleting,
    Other(String),
}

impl AppStatus {
    /// Whether a remote operation is still in progress on the application.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            AppStatus::Creating | AppStatus::Updating | AppStatus::Deleting
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            AppStatus::Creating => "creating",
            AppStatus::Running => "running",
            AppStatus::Updating => "updating",
            AppStatus::Deleting => "deleting",
            AppStatus::Other(s) => s,
        }
    }
}

impl Default for AppStatus {
    fn default() -> Self {
        AppStatus::Other(String::new())
    }
}

impl From<String> for AppStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "creating" => AppStatus::Creating,
            "running" => AppStatus::Running,
            "updating" => AppStatus::Updating,
            "deleting" => AppStatus::Deleting,
            _ => AppStatus::Other(s),
        }
    }
}

impl From<&str> for AppStatus {
    fn from(s: &str) -> Self {
        AppStatus::from(s.to_owned())
    }
}

impl From<AppStatus> for String {
    fn from(status: AppStatus) -> Self {
        match status {
            AppStatus::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application as observed on the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub generation: String,
    #[serde(default)]
    pub locked: bool,
    pub name: String,
    /// Active release id; empty when nothing has been promoted yet.
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub router: String,
    #[serde(default)]
    pub status: AppStatus,
    #[serde(default)]
    pub parameters: Parameters,
}

impl App {
    pub fn active_release(&self) -> Option<ReleaseId> {
        if self.release.is_empty() {
            None
        } else {
            Some(ReleaseId::new(self.release.clone()))
        }
    }

    /// The portable part of the application, without its transient status.
    pub fn descriptor(&self) -> AppDescriptor {
        AppDescriptor {
            generation: self.generation.clone(),
            locked: self.locked,
            name: self.name.clone(),
            release: self.release.clone(),
            router: self.router.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Application fields carried inside a bundle as `app.json`.
///
/// Documents written by older exporters may still carry a `status` key; it is
/// ignored on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    #[serde(default)]
    pub generation: String,
    #[serde(default)]
    pub locked: bool,
    pub name: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub router: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl AppDescriptor {
    pub fn generation(&self) -> Option<&str> {
        if self.generation.is_empty() {
            None
        } else {
            Some(&self.generation)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCreateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUpdateOptions {
    #[serde(default)]
    pub parameters: Parameters,
}
