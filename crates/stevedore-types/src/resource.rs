use crate::ValidationError;
use serde::{Deserialize, Serialize};

/// A bindable external dependency of an application, such as a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Resource names become archive entry names, so they are restricted to
/// `[A-Za-z0-9_.-]`, 1-64 characters, without a leading dot.
pub fn validate_resource_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidResourceName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    if name.is_empty() || name.len() > 64 {
        return Err(invalid("must be 1-64 characters"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(invalid("must match [a-zA-Z0-9_.-]"));
    }
    Ok(())
}
