//! Build-info data model: build keys, modules, artifacts, dependencies, partials.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use buildtrail_util::hash::Checksums;

use crate::error::EngineError;

/// Schema version written into every aggregated document.
pub const BUILD_INFO_VERSION: &str = "1.0.1";

/// Module id used when no build tool yields a coordinate.
pub const GENERIC_MODULE_ID: &str = "generic";

/// Identity of one tracked build: `(name, number, project)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BuildRunKey {
    pub name: String,
    pub number: String,
    pub project: String,
}

impl BuildRunKey {
    pub fn new(name: &str, number: &str, project: &str) -> Self {
        Self {
            name: name.to_owned(),
            number: number.to_owned(),
            project: project.to_owned(),
        }
    }

    /// `true` if both name and number are set, i.e. metadata is recorded.
    pub fn is_tracked(&self) -> bool {
        !self.name.is_empty() && !self.number.is_empty()
    }

    /// Require a tracked key for `operation`.
    ///
    /// # Errors
    /// Returns `EngineError::UntrackedBuild` if name or number is empty.
    pub fn require_tracked(&self, operation: &'static str) -> Result<(), EngineError> {
        if self.is_tracked() {
            Ok(())
        } else {
            Err(EngineError::UntrackedBuild { operation })
        }
    }

    /// Stable, filesystem-safe identifier for this key.
    pub fn cache_id(&self) -> String {
        buildtrail_util::hash::sha256_multi(&[&self.name, &self.number, &self.project])
    }
}

impl fmt::Display for BuildRunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.number)?;
        if !self.project.is_empty() {
            write!(f, " (project {})", self.project)?;
        }
        Ok(())
    }
}

/// The build tool family a module identity was derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    #[default]
    Generic,
    Maven,
    Gradle,
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Generic => "generic",
            Self::Maven => "maven",
            Self::Gradle => "gradle",
        };
        f.write_str(s)
    }
}

/// A resolved `(module id, module type)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIdentity {
    pub id: String,
    pub module_type: ModuleType,
}

impl ModuleIdentity {
    pub fn new(id: &str, module_type: ModuleType) -> Self {
        Self {
            id: id.to_owned(),
            module_type,
        }
    }

    /// The `generic` fallback identity.
    pub fn generic() -> Self {
        Self::new(GENERIC_MODULE_ID, ModuleType::Generic)
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.module_type)
    }
}

/// A file produced by the build and uploaded to the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub artifact_type: String,
    #[serde(flatten)]
    pub checksum: Checksums,
}

/// A file the build consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Local path or repository-qualified name.
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub dependency_type: String,
    #[serde(flatten)]
    pub checksum: Checksums,
}

/// A coordinate-identified group of artifacts and dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl Module {
    /// An empty module carrying `identity`.
    pub fn empty(identity: &ModuleIdentity) -> Self {
        Self {
            id: identity.id.clone(),
            module_type: identity.module_type,
            artifacts: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

/// One persisted fragment of build metadata, written once per save call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partial {
    pub module_id: String,
    pub module_type: ModuleType,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Dependency>>,
}

impl Partial {
    pub fn artifacts(identity: &ModuleIdentity, artifacts: Vec<Artifact>) -> Self {
        Self {
            module_id: identity.id.clone(),
            module_type: identity.module_type,
            timestamp_ms: now_ms(),
            artifacts: Some(artifacts),
            dependencies: None,
        }
    }

    pub fn dependencies(identity: &ModuleIdentity, dependencies: Vec<Dependency>) -> Self {
        Self {
            module_id: identity.id.clone(),
            module_type: identity.module_type,
            timestamp_ms: now_ms(),
            artifacts: None,
            dependencies: Some(dependencies),
        }
    }
}

/// Per-key header created on first save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub name: String,
    pub number: String,
    #[serde(default)]
    pub project: String,
    pub started_ms: u64,
}

impl BuildRecord {
    pub fn new(key: &BuildRunKey, started_ms: u64) -> Self {
        Self {
            name: key.name.clone(),
            number: key.number.clone(),
            project: key.project.clone(),
            started_ms,
        }
    }
}

/// The aggregated build-info document. Only produced by aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: String,
    pub name: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    pub started_ms: u64,
    #[serde(default)]
    pub modules: Vec<Module>,
}

impl BuildInfo {
    /// Look up a module by id.
    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }
}

/// Milliseconds since the Unix epoch, saturating on overflow.
pub fn now_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(elapsed).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tracked_requires_name_and_number() {
        assert!(BuildRunKey::new("b", "1", "").is_tracked());
        assert!(!BuildRunKey::new("", "1", "p").is_tracked());
        assert!(!BuildRunKey::new("b", "", "p").is_tracked());
    }

    #[test]
    fn require_tracked_names_the_operation() {
        let err = BuildRunKey::new("b", "", "")
            .require_tracked("aggregate build info")
            .unwrap_err()
            .to_string();
        assert_eq!(err, "build name and number are required to aggregate build info");
    }

    #[test]
    fn cache_id_distinguishes_projects() {
        let a = BuildRunKey::new("b", "1", "");
        let b = BuildRunKey::new("b", "1", "core");
        assert_ne!(a.cache_id(), b.cache_id());
        assert_eq!(a.cache_id(), BuildRunKey::new("b", "1", "").cache_id());
    }

    #[test]
    fn key_display() {
        assert_eq!(BuildRunKey::new("app", "7", "").to_string(), "app/7");
        assert_eq!(BuildRunKey::new("app", "7", "p").to_string(), "app/7 (project p)");
    }

    #[test]
    fn dependency_json_shape() {
        let dep = Dependency {
            id: "libs/a.jar".to_owned(),
            dependency_type: "file".to_owned(),
            checksum: Checksums::from_hex("AA", "bb", "cc"),
        };
        let json = serde_json::to_value(&dep).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "libs/a.jar", "type": "file", "sha1": "aa", "md5": "bb", "sha256": "cc"})
        );
        let back: Dependency = serde_json::from_value(json).unwrap();
        assert_eq!(back, dep);
    }

    #[test]
    fn module_type_serializes_lowercase() {
        let module = Module::empty(&ModuleIdentity::new("g:a:1", ModuleType::Maven));
        let json = serde_json::to_string(&module).unwrap();
        assert_eq!(json, r#"{"id":"g:a:1","type":"maven"}"#);
    }

    #[test]
    fn partial_omits_absent_lists() {
        let partial = Partial::dependencies(&ModuleIdentity::generic(), Vec::new());
        let json = serde_json::to_value(&partial).unwrap();
        assert!(json.get("artifacts").is_none());
        assert_eq!(json.get("dependencies"), Some(&serde_json::json!([])));
        assert_eq!(json.get("moduleType"), Some(&serde_json::json!("generic")));
    }
}
