//! Dependency and artifact collection from local globs or repository search.

use std::path::{Path, PathBuf};

use buildtrail_config::filespec::{FileSpec, FileSpecEntry};
use buildtrail_util::error::UtilError;
use buildtrail_util::fs::to_slash;
use buildtrail_util::glob::{ExclusionFilter, GlobPattern};
use buildtrail_util::hash::{checksum_file, Checksums};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::model::{Artifact, Dependency};
use crate::remote::RepositorySearch;

/// Dependency type recorded for local files.
pub const LOCAL_DEPENDENCY_TYPE: &str = "file";

/// One pattern to collect, with the options that travel with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternQuery {
    pub pattern: String,
    /// Glob patterns removing local matches.
    pub exclusions: Vec<String>,
    /// Remote searches also match below the pattern's path.
    pub recursive: bool,
    /// Repository location prefix for recorded artifacts.
    pub target: String,
    /// Record artifacts by file name only, dropping their local hierarchy.
    pub flat: bool,
}

impl PatternQuery {
    /// A query for an explicitly supplied pattern.
    pub fn explicit(pattern: &str, exclusions: &[String], recursive: bool) -> Self {
        Self {
            pattern: pattern.trim().to_owned(),
            exclusions: exclusions.to_vec(),
            recursive,
            target: String::new(),
            flat: false,
        }
    }

    /// A query for one file-spec entry. The entry's exclusions come first,
    /// followed by `global_exclusions`.
    pub fn from_spec(entry: &FileSpecEntry, global_exclusions: &[String]) -> Self {
        let mut exclusions = entry.exclusion_patterns();
        exclusions.extend(global_exclusions.iter().cloned());
        Self {
            pattern: entry.pattern.trim().to_owned(),
            exclusions,
            recursive: entry.recursive(),
            target: entry.target.clone(),
            flat: entry.flat(),
        }
    }

    /// One query per pattern-bearing entry of `spec`.
    ///
    /// # Errors
    /// Returns `FileSpecError::NoPatterns` if no entry has a pattern.
    pub fn from_file_spec(spec: &FileSpec, global_exclusions: &[String]) -> Result<Vec<Self>, EngineError> {
        Ok(spec
            .pattern_entries()?
            .into_iter()
            .map(|entry| Self::from_spec(entry, global_exclusions))
            .collect())
    }
}

/// Where dependencies are collected from.
#[derive(Clone, Copy)]
pub enum DependencySource<'a> {
    /// Files on the local filesystem, checksummed here.
    Local,
    /// Files already in the artifact repository.
    Remote(&'a dyn RepositorySearch),
}

impl std::fmt::Debug for DependencySource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Remote(_) => f.write_str("Remote"),
        }
    }
}

/// Collect dependencies for every query, in query order.
///
/// # Errors
/// Returns `EngineError::NoPatterns` for an empty query list, or the first
/// expansion, checksum or search error; nothing is returned on failure.
pub fn collect_dependencies(
    queries: &[PatternQuery],
    source: DependencySource<'_>,
) -> Result<Vec<Dependency>, EngineError> {
    if queries.is_empty() {
        return Err(EngineError::NoPatterns);
    }
    let dependencies = match source {
        DependencySource::Local => collect_local(queries)?,
        DependencySource::Remote(repo) => collect_remote(queries, repo)?,
    };
    info!("collected {} dependency(ies)", dependencies.len());
    Ok(dependencies)
}

/// Glob, filter and checksum local files.
///
/// # Errors
/// Returns the first pattern-expansion or checksum error.
pub fn collect_local(queries: &[PatternQuery]) -> Result<Vec<Dependency>, EngineError> {
    let mut dependencies = Vec::new();
    for query in queries {
        let paths = matched_files(query)?;
        for (path, checksum) in checksum_all(&paths)? {
            dependencies.push(Dependency {
                id: to_slash(&path),
                dependency_type: LOCAL_DEPENDENCY_TYPE.to_owned(),
                checksum,
            });
        }
    }
    Ok(dependencies)
}

/// Search the repository for every query and drain each result stream.
///
/// # Errors
/// Returns an error if a search cannot start or its stream ends in error.
pub fn collect_remote(
    queries: &[PatternQuery],
    repo: &dyn RepositorySearch,
) -> Result<Vec<Dependency>, EngineError> {
    let mut dependencies = Vec::new();
    for query in queries {
        let mut stream = repo.search(&query.pattern, query.recursive)?;
        let before = dependencies.len();
        dependencies.extend(stream.by_ref().map(|item| item.to_dependency()));
        if let Some(e) = stream.take_error() {
            return Err(e);
        }
        debug!(
            pattern = %query.pattern,
            count = dependencies.len().saturating_sub(before),
            "remote search complete"
        );
    }
    Ok(dependencies)
}

/// Glob local files and describe them as artifacts placed under each query's target.
///
/// With `flat`, the artifact path is the target plus the file name; otherwise
/// it keeps the file's location below the pattern's static root.
///
/// # Errors
/// Returns the first pattern-expansion or checksum error.
pub fn collect_artifacts(queries: &[PatternQuery]) -> Result<Vec<Artifact>, EngineError> {
    let mut artifacts = Vec::new();
    for query in queries {
        let glob = GlobPattern::compile(&query.pattern)?;
        let root = Path::new(glob.static_root());
        let paths = matched_files(query)?;
        for (path, checksum) in checksum_all(&paths)? {
            artifacts.push(artifact_for(&path, root, query, checksum));
        }
    }
    info!("collected {} artifact(s)", artifacts.len());
    Ok(artifacts)
}

fn artifact_for(path: &Path, root: &Path, query: &PatternQuery, checksum: Checksums) -> Artifact {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let relative = if query.flat {
        name.clone()
    } else {
        to_slash(path.strip_prefix(root).unwrap_or(path))
    };
    let target = query.target.trim_end_matches('/');
    let full = if target.is_empty() {
        relative
    } else {
        format!("{target}/{relative}")
    };
    Artifact {
        artifact_type: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
        name,
        path: full,
        checksum,
    }
}

fn matched_files(query: &PatternQuery) -> Result<Vec<PathBuf>, EngineError> {
    let glob = GlobPattern::compile(&query.pattern)?;
    let filter = ExclusionFilter::new(&query.exclusions);
    let matched = glob.expand()?;
    let total = matched.len();
    let kept: Vec<PathBuf> = matched
        .into_iter()
        .filter(|p| !filter.is_excluded(&to_slash(p)))
        .collect();
    debug!(
        pattern = %query.pattern,
        matched = total,
        excluded = total.saturating_sub(kept.len()),
        "local pattern expanded"
    );
    Ok(kept)
}

/// Checksum every path in parallel, keeping input order.
fn checksum_all(paths: &[PathBuf]) -> Result<Vec<(PathBuf, Checksums)>, EngineError> {
    let sums = paths
        .par_iter()
        .map(|p| checksum_file(p).map(|c| (p.clone(), c)))
        .collect::<Result<Vec<_>, UtilError>>()?;
    Ok(sums)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;
    use crate::remote::{BufferedSearch, SearchItem, SearchStream};

    fn tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("libs/nested")).unwrap();
        fs::write(root.join("libs/a.jar"), b"a").unwrap();
        fs::write(root.join("libs/nested/b.jar"), b"b").unwrap();
        fs::write(root.join("libs/nested/c-tests.jar"), b"c").unwrap();
        fs::write(root.join("libs/readme.txt"), b"r").unwrap();
        tmp
    }

    fn pattern(tmp: &tempfile::TempDir, rest: &str) -> String {
        format!("{}/{rest}", to_slash(tmp.path()))
    }

    fn ids(deps: &[Dependency]) -> Vec<String> {
        deps.iter()
            .map(|d| d.id.rsplit('/').next().unwrap().to_owned())
            .collect()
    }

    /// Serves canned results per pattern, optionally failing after them.
    struct FakeSearch {
        items: Vec<SearchItem>,
        fail: bool,
    }

    impl RepositorySearch for FakeSearch {
        fn search(&self, pattern: &str, recursive: bool) -> Result<Box<dyn SearchStream>, EngineError> {
            let items: Vec<SearchItem> = self
                .items
                .iter()
                .filter(|i| pattern.starts_with(&i.repo))
                .filter(|i| recursive || i.path == ".")
                .cloned()
                .collect();
            if self.fail {
                Ok(Box::new(BufferedSearch::failing(
                    items,
                    EngineError::Remote {
                        message: "stream interrupted".to_owned(),
                    },
                )))
            } else {
                Ok(Box::new(BufferedSearch::new(items)))
            }
        }
    }

    fn item(repo: &str, path: &str, name: &str) -> SearchItem {
        SearchItem {
            repo: repo.to_owned(),
            path: path.to_owned(),
            name: name.to_owned(),
            actual_sha1: "AA".to_owned(),
            ..SearchItem::default()
        }
    }

    #[test]
    fn local_collects_checksummed_files() {
        let tmp = tree();
        let queries = [PatternQuery::explicit(&pattern(&tmp, "libs/**/*.jar"), &[], true)];
        let deps = collect_dependencies(&queries, DependencySource::Local).unwrap();

        assert_eq!(ids(&deps), vec!["a.jar", "b.jar", "c-tests.jar"]);
        let first = deps.first().unwrap();
        assert_eq!(first.dependency_type, "file");
        assert_eq!(first.checksum.sha1, "86f7e437faa5a7fce15d1ddcb9eaeaea377667b8");
        assert!(first.id.ends_with("/libs/a.jar"));
    }

    #[test]
    fn local_exclusions_remove_matches() {
        let tmp = tree();
        let queries = [PatternQuery::explicit(
            &pattern(&tmp, "libs/**/*.jar"),
            &["**/*-tests.jar".to_owned()],
            true,
        )];
        let deps = collect_local(&queries).unwrap();
        assert_eq!(ids(&deps), vec!["a.jar", "b.jar"]);
    }

    #[test]
    fn empty_exclusions_remove_nothing() {
        let tmp = tree();
        let queries = [PatternQuery::explicit(&pattern(&tmp, "libs/*"), &[], true)];
        let deps = collect_local(&queries).unwrap();
        assert_eq!(ids(&deps), vec!["a.jar", "readme.txt"]);
    }

    #[test]
    fn no_queries_is_an_error() {
        let err = collect_dependencies(&[], DependencySource::Local).unwrap_err();
        assert!(matches!(err, EngineError::NoPatterns));
    }

    #[test]
    fn spec_entry_exclusions_extend_global_ones() {
        let spec = FileSpec::parse(
            r#"{"files":[{"pattern":"libs/*.jar","exclusions":"*-tests.jar","recursive":"false","flat":"true","target":"repo/x/"},{"pattern":" "}]}"#,
        )
        .unwrap();
        let queries = PatternQuery::from_file_spec(&spec, &["*.txt".to_owned()]).unwrap();
        assert_eq!(queries.len(), 1);
        let query = queries.first().unwrap();
        assert_eq!(query.exclusions, vec!["*-tests.jar", "*.txt"]);
        assert!(!query.recursive);
        assert!(query.flat);
        assert_eq!(query.target, "repo/x/");
    }

    #[test]
    fn remote_maps_items_to_qualified_ids() {
        let search = FakeSearch {
            items: vec![item("libs", ".", "a.jar"), item("libs", "com/acme", "b.jar")],
            fail: false,
        };
        let queries = [PatternQuery::explicit("libs/*.jar", &[], true)];
        let deps = collect_dependencies(&queries, DependencySource::Remote(&search)).unwrap();
        let got: Vec<&str> = deps.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(got, vec!["libs/a.jar", "libs/com/acme/b.jar"]);
        assert_eq!(deps.first().unwrap().checksum.sha1, "aa");
        assert_eq!(deps.first().unwrap().dependency_type, "jar");
    }

    #[test]
    fn remote_respects_recursive_flag() {
        let search = FakeSearch {
            items: vec![item("libs", ".", "a.jar"), item("libs", "com/acme", "b.jar")],
            fail: false,
        };
        let queries = [PatternQuery::explicit("libs/*.jar", &[], false)];
        let deps = collect_remote(&queries, &search).unwrap();
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn remote_stream_error_aborts() {
        let search = FakeSearch {
            items: vec![item("libs", ".", "a.jar")],
            fail: true,
        };
        let queries = [PatternQuery::explicit("libs/*.jar", &[], true)];
        let err = collect_remote(&queries, &search).unwrap_err().to_string();
        assert!(err.contains("stream interrupted"), "error was: {err}");
    }

    #[test]
    fn artifacts_keep_hierarchy_under_target() {
        let tmp = tree();
        let mut query = PatternQuery::explicit(&pattern(&tmp, "libs/**/*.jar"), &[], true);
        query.target = "release-local/app/".to_owned();
        let artifacts = collect_artifacts(&[query]).unwrap();

        let paths: Vec<&str> = artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "release-local/app/a.jar",
                "release-local/app/nested/b.jar",
                "release-local/app/nested/c-tests.jar",
            ]
        );
        let b = artifacts.get(1).unwrap();
        assert_eq!(b.name, "b.jar");
        assert_eq!(b.artifact_type, "jar");
        assert!(!b.checksum.sha256.is_empty());
    }

    #[test]
    fn flat_artifacts_use_file_name() {
        let tmp = tree();
        let mut query = PatternQuery::explicit(&pattern(&tmp, "libs/**/b.jar"), &[], true);
        query.target = "release-local".to_owned();
        query.flat = true;
        let artifacts = collect_artifacts(&[query]).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts.first().unwrap().path, "release-local/b.jar");
    }

    #[test]
    fn missing_root_collects_nothing() {
        let tmp = tree();
        let queries = [PatternQuery::explicit(&pattern(&tmp, "missing/**/*.jar"), &[], true)];
        assert!(collect_local(&queries).unwrap().is_empty());
    }

    #[test]
    fn root_through_file_aborts_collection() {
        let tmp = tree();
        let queries = [
            PatternQuery::explicit(&pattern(&tmp, "libs/*.jar"), &[], true),
            PatternQuery::explicit(&pattern(&tmp, "libs/a.jar/sub/*.jar"), &[], true),
        ];
        let err = collect_dependencies(&queries, DependencySource::Local).unwrap_err();
        assert!(matches!(err, EngineError::Util(UtilError::Walk { .. })), "error was: {err}");
    }
}
