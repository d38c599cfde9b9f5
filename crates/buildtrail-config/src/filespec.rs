//! File-spec documents: `{"files": [{"pattern": ..., "target": ..., ...}]}`.
//!
//! Only pattern-based entries are meaningful here. Query-style fields
//! (`aql`, `build`, `bundle`, `sortBy`, `sortOrder`, `limit`, `offset`) are
//! accepted so real-world specs parse, but nothing reads them.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A parsed file-spec document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSpec {
    #[serde(default)]
    pub files: Vec<FileSpecEntry>,
}

/// One entry of the `files` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpecEntry {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub props: String,
    #[serde(default)]
    pub target_props: String,
    #[serde(default)]
    pub exclusions: String,
    /// Boolean or boolean-like string; see [`FileSpecEntry::recursive`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<serde_json::Value>,
    /// Boolean or boolean-like string; see [`FileSpecEntry::flat`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aql: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl FileSpecEntry {
    /// Whether matching descends into sub-directories. Defaults to `true`
    /// when absent or unparsable.
    pub fn recursive(&self) -> bool {
        self.recursive.as_ref().and_then(as_bool).unwrap_or(true)
    }

    /// Whether uploads drop the source hierarchy. Defaults to `false` when
    /// absent or unparsable.
    pub fn flat(&self) -> bool {
        self.flat.as_ref().and_then(as_bool).unwrap_or(false)
    }

    /// Exclusion globs from the comma-separated `exclusions` field.
    pub fn exclusion_patterns(&self) -> Vec<String> {
        self.exclusions
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Properties to attach, preferring `targetProps` over `props`.
    pub fn properties(&self) -> Option<&str> {
        [self.target_props.as_str(), self.props.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|p| !p.is_empty())
    }

    /// `true` if the entry carries a usable pattern.
    pub fn has_pattern(&self) -> bool {
        !self.pattern.trim().is_empty()
    }
}

impl FileSpec {
    /// Parse a spec from JSON text.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid spec document.
    pub fn parse(text: &str) -> Result<Self, FileSpecError> {
        serde_json::from_str(text).map_err(|source| FileSpecError::Parse { source })
    }

    /// Read a spec from disk, substituting `${name}` tokens from `vars` first.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not parse.
    pub fn from_path(path: &Path, vars: Option<&str>) -> Result<Self, FileSpecError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FileSpecError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let text = match vars {
            Some(v) => apply_spec_vars(&raw, v),
            None => raw,
        };
        Self::parse(&text)
    }

    /// Entries that carry a non-blank pattern, in document order.
    ///
    /// # Errors
    /// Returns `FileSpecError::NoPatterns` if no entry has a pattern.
    pub fn pattern_entries(&self) -> Result<Vec<&FileSpecEntry>, FileSpecError> {
        let entries: Vec<_> = self.files.iter().filter(|f| f.has_pattern()).collect();
        if entries.is_empty() {
            return Err(FileSpecError::NoPatterns);
        }
        Ok(entries)
    }
}

/// Replace `${key}` tokens in `content` with values from a flat `key=value` list.
///
/// The list separator is `;` if the list contains one, otherwise `,`; that
/// single separator is then used for the whole list. Pairs split on their
/// first `=`. Malformed pairs and empty keys are ignored; a repeated key
/// keeps its last value.
pub fn apply_spec_vars(content: &str, vars: &str) -> String {
    if vars.trim().is_empty() {
        return content.to_owned();
    }
    let separator = [';', ','].into_iter().find(|sep| vars.contains(*sep));
    let pairs: Vec<&str> = match separator {
        Some(sep) => vars.split(sep).collect(),
        None => vec![vars],
    };

    let mut bindings: Vec<(&str, &str)> = Vec::new();
    for pair in pairs {
        let Some((key, value)) = pair.trim().split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        bindings.retain(|(k, _)| *k != key);
        bindings.push((key, value.trim()));
    }

    bindings
        .into_iter()
        .fold(content.to_owned(), |acc, (key, value)| {
            acc.replace(&format!("${{{key}}}"), value)
        })
}

/// Interpret a JSON boolean or a boolean-like string.
fn as_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileSpecError {
    #[error("cannot read file spec {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid file spec: {source}")]
    Parse { source: serde_json::Error },
    #[error("file spec does not include any entry with a pattern")]
    NoPatterns,
}
