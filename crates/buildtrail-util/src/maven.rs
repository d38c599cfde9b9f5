//! Maven coordinates and project descriptor (`pom.xml`) reading.

use std::fmt;
use std::path::Path;

use crate::error::UtilError;

/// Default project descriptor file name.
pub const DEFAULT_POM: &str = "pom.xml";

/// A `group:artifact:version` coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoordinate {
    /// Maven group identifier, e.g. `"com.example"`.
    pub group_id: String,
    /// Maven artifact identifier, e.g. `"demo"`.
    pub artifact_id: String,
    /// Project version, e.g. `"1.2.3"`.
    pub version: String,
}

impl MavenCoordinate {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            artifact_id: artifact_id.to_owned(),
            version: version.to_owned(),
        }
    }

    /// Read the project coordinate from a descriptor file.
    ///
    /// Only direct children of the root `<project>` element are considered
    /// for `groupId`, `artifactId` and `version`. An empty `groupId` or
    /// `version` falls back to the corresponding `<parent>` field.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not well-formed XML,
    /// or any coordinate field is still empty after parent fallback.
    pub fn from_pom(path: &Path) -> Result<Self, UtilError> {
        let content = std::fs::read_to_string(path).map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pom_str(&content, &path.display().to_string())
    }

    /// Parse a descriptor already loaded into memory. `origin` labels errors.
    ///
    /// # Errors
    /// See [`MavenCoordinate::from_pom`].
    pub fn from_pom_str(content: &str, origin: &str) -> Result<Self, UtilError> {
        let doc = roxmltree::Document::parse(content).map_err(|e| UtilError::DescriptorParse {
            path: origin.to_owned(),
            message: e.to_string(),
        })?;
        let project = doc.root_element();

        let group = child_text(project, "groupId");
        let artifact = child_text(project, "artifactId");
        let version = child_text(project, "version");

        let parent = project
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "parent");
        let parent_group = parent.map(|p| child_text(p, "groupId")).unwrap_or_default();
        let parent_version = parent.map(|p| child_text(p, "version")).unwrap_or_default();

        let coord = Self {
            group_id: if group.is_empty() { parent_group } else { group },
            artifact_id: artifact,
            version: if version.is_empty() { parent_version } else { version },
        };

        let missing: Vec<&str> = [
            ("groupId", coord.group_id.is_empty()),
            ("artifactId", coord.artifact_id.is_empty()),
            ("version", coord.version.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(UtilError::DescriptorIncomplete {
                path: origin.to_owned(),
                missing: missing.join(", "),
            });
        }

        Ok(coord)
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Trimmed text of the first direct child element named `name`, or `""`.
fn child_text(node: roxmltree::Node<'_, '_>, name: &str) -> String {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FULL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>com.example</groupId>
  <artifactId>demo</artifactId>
  <version>1.2.3</version>
</project>"#;

    #[test]
    fn full_descriptor() {
        let coord = MavenCoordinate::from_pom_str(FULL, "pom.xml").unwrap();
        assert_eq!(coord, MavenCoordinate::new("com.example", "demo", "1.2.3"));
        assert_eq!(coord.to_string(), "com.example:demo:1.2.3");
    }

    #[test]
    fn missing_fields_fall_back_to_parent() {
        let pom = r#"<project>
  <parent>
    <groupId>org.parent</groupId>
    <artifactId>parent-pom</artifactId>
    <version>9.0</version>
  </parent>
  <artifactId>child</artifactId>
</project>"#;
        let coord = MavenCoordinate::from_pom_str(pom, "pom.xml").unwrap();
        assert_eq!(coord.to_string(), "org.parent:child:9.0");
    }

    #[test]
    fn only_missing_fields_fall_back() {
        let pom = r#"<project>
  <parent>
    <groupId>org.parent</groupId>
    <version>9.0</version>
  </parent>
  <groupId>org.own</groupId>
  <artifactId>child</artifactId>
</project>"#;
        let coord = MavenCoordinate::from_pom_str(pom, "pom.xml").unwrap();
        assert_eq!(coord.group_id, "org.own");
        assert_eq!(coord.version, "9.0");
    }

    #[test]
    fn parent_artifact_is_never_used() {
        let pom = r#"<project>
  <parent>
    <groupId>org.parent</groupId>
    <artifactId>parent-pom</artifactId>
    <version>9.0</version>
  </parent>
</project>"#;
        let err = MavenCoordinate::from_pom_str(pom, "pom.xml")
            .unwrap_err()
            .to_string();
        assert!(err.contains("artifactId"), "error was: {err}");
    }

    #[test]
    fn nested_dependency_coordinates_are_ignored() {
        let pom = r#"<project>
  <groupId>com.example</groupId>
  <artifactId>demo</artifactId>
  <version>1.0</version>
  <dependencies>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13</version>
    </dependency>
  </dependencies>
</project>"#;
        let coord = MavenCoordinate::from_pom_str(pom, "pom.xml").unwrap();
        assert_eq!(coord.to_string(), "com.example:demo:1.0");
    }

    #[test]
    fn whitespace_only_values_are_empty() {
        let pom = "<project><groupId>  </groupId><artifactId>a</artifactId><version>1</version></project>";
        let err = MavenCoordinate::from_pom_str(pom, "p.xml")
            .unwrap_err()
            .to_string();
        assert!(err.contains("groupId"), "error was: {err}");
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = MavenCoordinate::from_pom_str("<project><groupId>", "bad.xml")
            .unwrap_err()
            .to_string();
        assert!(err.contains("cannot parse project descriptor"), "error was: {err}");
    }

    #[test]
    fn from_pom_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_POM);
        std::fs::write(&path, FULL).unwrap();
        let coord = MavenCoordinate::from_pom(&path).unwrap();
        assert_eq!(coord.artifact_id, "demo");
    }

    #[test]
    fn from_pom_missing_file() {
        let err = MavenCoordinate::from_pom(Path::new("/nonexistent/pom.xml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("cannot access"), "error was: {err}");
    }
}
