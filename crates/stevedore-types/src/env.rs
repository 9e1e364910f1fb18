use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// A parsed `KEY=VALUE` environment blob.
///
/// Entries keep their original order. The raw blob is what travels between
/// export and import; parsing exists to list its keys and to compare blobs at
/// the key/value level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    entries: Vec<(String, String)>,
}

impl Environment {
    /// Parse a newline-delimited blob. `\r\n` is accepted.
    ///
    /// Blank lines and `#` comments are skipped. Lines without `=` or with an
    /// empty key are skipped with a warning, so any blob a control plane
    /// hands out can be carried through an export and back in.
    pub fn parse(blob: &str) -> Self {
        let mut entries = Vec::new();
        for (idx, raw) in blob.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    entries.push((key.to_owned(), value.to_owned()));
                }
                Some(_) => warn!("env line {}: empty key, skipped", idx + 1),
                None => warn!("env line {}: missing '=', skipped", idx + 1),
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Key/value view; a repeated key resolves to its last value.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }

    /// Whether both blobs define the same key/value set, ignoring line order.
    pub fn same_entries(&self, other: &Environment) -> bool {
        self.to_map() == other.to_map()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
