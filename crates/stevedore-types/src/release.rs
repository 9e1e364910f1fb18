use crate::types::{BuildId, ReleaseId};
use serde::{Deserialize, Serialize};

/// Immutable configuration snapshot of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildId>,
    #[serde(default)]
    pub env: String,
    #[serde(default)]
    pub created: String,
}

/// Build artifact registered on the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub app: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCreateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_without_build_deserializes() {
        let json = r#"{"id":"release1","app":"app1","env":"FOO=bar"}"#;
        let r: Release = serde_json::from_str(json).unwrap();
        assert_eq!(r.id, "release1");
        assert!(r.build.is_none());
        assert!(r.created.is_empty());
    }

    #[test]
    fn release_create_options_omit_absent_fields() {
        let opts = ReleaseCreateOptions {
            build: Some(BuildId::new("build1")),
            env: None,
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert_eq!(json, "{\"build\":\"build1\"}");
    }
}
