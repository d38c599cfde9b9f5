//! Artifact repository capabilities: file search and build-info ingestion.
//!
//! The engine only talks to the repository through [`RepositorySearch`] and
//! [`BuildInfoPublisher`]. [`HttpRepository`] implements both over the
//! repository's REST API.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::EngineError;
use crate::model::{BuildInfo, Checksums, Dependency};

/// Sub-path the repository reports for items at a repository's root.
pub const NO_SUBPATH: &str = ".";

/// One file found by a repository search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchItem {
    pub repo: String,
    pub path: String,
    pub name: String,
    pub actual_sha1: String,
    pub actual_md5: String,
    pub sha256: String,
}

impl SearchItem {
    /// `repo/path/name`, or `repo/name` for items at the repository root.
    pub fn qualified_id(&self) -> String {
        if self.path.is_empty() || self.path == NO_SUBPATH {
            format!("{}/{}", self.repo, self.name)
        } else {
            format!("{}/{}/{}", self.repo, self.path, self.name)
        }
    }

    pub fn to_dependency(&self) -> Dependency {
        let dependency_type = self
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_owned())
            .unwrap_or_default();
        Dependency {
            id: self.qualified_id(),
            dependency_type,
            checksum: Checksums::from_hex(&self.actual_sha1, &self.actual_md5, &self.sha256),
        }
    }
}

/// A stream of search results whose failure is only known once it is drained.
pub trait SearchStream: Iterator<Item = SearchItem> {
    /// The error that ended the stream early, if any.
    /// Meaningful only after the iterator returned `None`.
    fn take_error(&mut self) -> Option<EngineError>;
}

/// A search stream over results already held in memory.
#[derive(Debug, Default)]
pub struct BufferedSearch {
    items: std::vec::IntoIter<SearchItem>,
    error: Option<EngineError>,
}

impl BufferedSearch {
    pub fn new(items: Vec<SearchItem>) -> Self {
        Self {
            items: items.into_iter(),
            error: None,
        }
    }

    /// Yield `items`, then report `error`.
    pub fn failing(items: Vec<SearchItem>, error: EngineError) -> Self {
        Self {
            items: items.into_iter(),
            error: Some(error),
        }
    }
}

impl Iterator for BufferedSearch {
    type Item = SearchItem;

    fn next(&mut self) -> Option<SearchItem> {
        self.items.next()
    }
}

impl SearchStream for BufferedSearch {
    fn take_error(&mut self) -> Option<EngineError> {
        self.error.take()
    }
}

/// Finds files in the repository matching a `repo/path/name` pattern.
pub trait RepositorySearch {
    /// # Errors
    /// Returns an error if the search cannot be started.
    fn search(&self, pattern: &str, recursive: bool) -> Result<Box<dyn SearchStream>, EngineError>;
}

/// Accepts an aggregated build-info document.
pub trait BuildInfoPublisher {
    /// # Errors
    /// Returns an error if the repository rejects or fails the upload.
    fn publish(&self, info: &BuildInfo, project: &str) -> Result<(), EngineError>;
}

/// Repository REST client.
#[derive(Debug)]
pub struct HttpRepository {
    base_url: String,
    access_token: Option<String>,
    agent: ureq::Agent,
}

impl HttpRepository {
    pub fn new(base_url: &str, access_token: Option<String>, timeout_secs: u64) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_connect(Some(Duration::from_secs(30)))
                .timeout_global(Some(Duration::from_secs(timeout_secs)))
                .build(),
        );
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            access_token: access_token.filter(|t| !t.is_empty()),
            agent,
        }
    }

    fn bearer(&self) -> Option<String> {
        self.access_token.as_ref().map(|t| format!("Bearer {t}"))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchItem>,
}

impl RepositorySearch for HttpRepository {
    fn search(&self, pattern: &str, recursive: bool) -> Result<Box<dyn SearchStream>, EngineError> {
        let url = format!("{}/api/search/aql", self.base_url);
        let query = aql_for_pattern(pattern, recursive);
        debug!("POST {url}: {query}");

        let mut request = self.agent.post(url.as_str()).header("Content-Type", "text/plain");
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", auth);
        }
        let response = request.send(query.as_str()).map_err(|e| EngineError::Remote {
            message: format!("search for '{pattern}' failed: {e}"),
        })?;
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| EngineError::Remote {
                message: format!("cannot read search response: {e}"),
            })?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| EngineError::Remote {
                message: format!("invalid search response: {e}"),
            })?;
        debug!("search for '{pattern}' returned {} item(s)", parsed.results.len());
        Ok(Box::new(BufferedSearch::new(parsed.results)))
    }
}

impl BuildInfoPublisher for HttpRepository {
    fn publish(&self, info: &BuildInfo, project: &str) -> Result<(), EngineError> {
        let url = format!("{}/api/build", self.base_url);
        let body = serde_json::to_string(info).map_err(|e| EngineError::Metadata {
            message: e.to_string(),
        })?;
        debug!("PUT {url} ({} bytes)", body.len());

        let mut request = self.agent.put(url.as_str()).header("Content-Type", "application/json");
        if !project.is_empty() {
            request = request.query("project", project);
        }
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", auth);
        }
        request.send(body.as_str()).map_err(|e| EngineError::Remote {
            message: format!("publishing build info {}/{} failed: {e}", info.name, info.number),
        })?;
        Ok(())
    }
}

/// Build the repository query for a `repo/path/name` wildcard pattern.
///
/// The first segment names the repository, the last one the file, and
/// anything between is the path. A recursive search also matches files
/// below that path.
pub fn aql_for_pattern(pattern: &str, recursive: bool) -> String {
    let trimmed = pattern.trim().trim_start_matches('/');
    let (repo, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    let (path, name) = rest.rsplit_once('/').unwrap_or(("", rest));
    let path = if path.is_empty() { NO_SUBPATH } else { path };
    let name = if name.is_empty() { "*" } else { name };

    let criteria = if recursive {
        let below = if path == NO_SUBPATH {
            "*".to_owned()
        } else {
            format!("{path}/*")
        };
        serde_json::json!({
            "repo": repo,
            "$or": [
                { "path": { "$match": path } },
                { "path": { "$match": below } },
            ],
            "name": { "$match": name },
        })
    } else {
        serde_json::json!({
            "repo": repo,
            "path": { "$match": path },
            "name": { "$match": name },
        })
    };
    format!(
        r#"items.find({criteria}).include("repo","path","name","actual_sha1","actual_md5","sha256")"#
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn criteria(aql: &str) -> serde_json::Value {
        let inner = aql
            .strip_prefix("items.find(")
            .and_then(|s| s.split_once(").include("))
            .map(|(json, _)| json)
            .unwrap();
        serde_json::from_str(inner).unwrap()
    }

    #[test]
    fn qualified_id_omits_root_subpath() {
        let item = SearchItem {
            repo: "libs".to_owned(),
            path: NO_SUBPATH.to_owned(),
            name: "a.jar".to_owned(),
            ..SearchItem::default()
        };
        assert_eq!(item.qualified_id(), "libs/a.jar");

        let nested = SearchItem {
            path: "com/acme".to_owned(),
            ..item
        };
        assert_eq!(nested.qualified_id(), "libs/com/acme/a.jar");
    }

    #[test]
    fn dependency_carries_remote_checksums() {
        let item: SearchItem = serde_json::from_str(
            r#"{"repo":"libs","path":"x","name":"lib.tar.gz","actual_sha1":"AB","actual_md5":"cd","sha256":"EF","size":10}"#,
        )
        .unwrap();
        let dep = item.to_dependency();
        assert_eq!(dep.id, "libs/x/lib.tar.gz");
        assert_eq!(dep.dependency_type, "gz");
        assert_eq!(dep.checksum, Checksums::from_hex("ab", "cd", "ef"));
    }

    #[test]
    fn aql_splits_repo_path_and_name() {
        let value = criteria(&aql_for_pattern("libs-release/com/acme/*.jar", false));
        assert_eq!(
            value,
            serde_json::json!({
                "repo": "libs-release",
                "path": { "$match": "com/acme" },
                "name": { "$match": "*.jar" },
            })
        );
    }

    #[test]
    fn aql_recursive_matches_below_path() {
        let value = criteria(&aql_for_pattern("libs/com/*.jar", true));
        assert_eq!(
            value.get("$or").unwrap(),
            &serde_json::json!([
                { "path": { "$match": "com" } },
                { "path": { "$match": "com/*" } },
            ])
        );
    }

    #[test]
    fn aql_repo_only_pattern() {
        let value = criteria(&aql_for_pattern("libs/", false));
        assert_eq!(value.get("repo").unwrap(), "libs");
        assert_eq!(value.get("path").unwrap(), &serde_json::json!({ "$match": "." }));
        assert_eq!(value.get("name").unwrap(), &serde_json::json!({ "$match": "*" }));
    }

    #[test]
    fn aql_includes_checksum_fields() {
        let aql = aql_for_pattern("libs/a.jar", true);
        assert!(aql.ends_with(r#".include("repo","path","name","actual_sha1","actual_md5","sha256")"#));
    }

    #[test]
    fn buffered_search_reports_error_after_items() {
        let mut stream = BufferedSearch::failing(
            vec![SearchItem::default()],
            EngineError::Remote {
                message: "connection reset".to_owned(),
            },
        );
        assert_eq!(stream.by_ref().count(), 1);
        assert!(stream.take_error().is_some());
        assert!(stream.take_error().is_none());
    }
}
