//! Double-star glob patterns: compilation, matching, and filesystem expansion.
//!
//! Grammar (slash-separated):
//! - `*` matches any run of characters within one path segment
//! - `**` as a whole segment matches zero or more path segments
//! - `?` matches exactly one character
//!
//! Everything else is literal. A `**` that shares its segment with other
//! characters (e.g. `**.jar`) behaves like `*`.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::UtilError;
use crate::fs::to_slash;

/// One matching unit inside a single path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Star,
    Question,
}

/// One slash-separated unit of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`: zero or more whole segments.
    AnySegments,
    Pieces(Vec<Piece>),
}

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    source: String,
    segments: Vec<Segment>,
}

impl GlobPattern {
    /// Compile `pattern` into a token sequence.
    ///
    /// Platform separators are normalized to `/` before compiling.
    ///
    /// # Errors
    /// Returns `UtilError::GlobPattern` if the pattern is empty.
    pub fn compile(pattern: &str) -> Result<Self, UtilError> {
        let source = normalize_separators(pattern);
        if source.is_empty() {
            return Err(UtilError::GlobPattern {
                pattern: pattern.to_owned(),
                message: "pattern is empty".to_owned(),
            });
        }

        let mut segments: Vec<Segment> = Vec::new();
        for raw in source.split('/') {
            let segment = compile_segment(raw);
            // `a/**/**/b` is the same as `a/**/b`.
            if segment == Segment::AnySegments && segments.last() == Some(&Segment::AnySegments) {
                continue;
            }
            segments.push(segment);
        }

        Ok(Self { source, segments })
    }

    /// The normalized pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `true` if the pattern contains no meta-characters.
    pub fn is_literal(&self) -> bool {
        !self.source.contains(['*', '?'])
    }

    /// The longest literal directory prefix of this pattern, or `""` if none.
    pub fn static_root(&self) -> &str {
        static_root(&self.source)
    }

    /// Test a forward-slash path against the full pattern.
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').collect();
        match_segments(&self.segments, &parts)
    }

    /// Walk the static root and return every regular file matching this pattern.
    ///
    /// Results follow a file-name-sorted walk, so they are stable for a fixed
    /// tree. A static root that does not exist yields no matches.
    ///
    /// # Errors
    /// Returns `UtilError::Walk` if the root cannot be inspected for any reason
    /// other than being absent, or if any directory under it cannot be read.
    pub fn expand(&self) -> Result<Vec<PathBuf>, UtilError> {
        let root = self.static_root();
        let defaulted = root.is_empty();
        let walk_root = if defaulted { Path::new(".") } else { Path::new(root) };

        match std::fs::symlink_metadata(walk_root) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(pattern = %self.source, root = %walk_root.display(), "static root does not exist");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(UtilError::Walk {
                    root: walk_root.display().to_string(),
                    pattern: self.source.clone(),
                    message: e.to_string(),
                });
            }
        }

        let mut matches = Vec::new();
        for entry in WalkDir::new(walk_root).sort_by_file_name() {
            let entry = entry.map_err(|e| UtilError::Walk {
                root: walk_root.display().to_string(),
                pattern: self.source.clone(),
                message: e.to_string(),
            })?;
            if !is_regular_file(&entry) {
                continue;
            }
            // Walking "." yields "./a/b"; the pattern was written as "a/b".
            let path = if defaulted {
                entry.path().strip_prefix(".").unwrap_or(entry.path())
            } else {
                entry.path()
            };
            if self.matches(&to_slash(path)) {
                matches.push(path.to_path_buf());
            }
        }

        debug!(pattern = %self.source, count = matches.len(), "expanded glob");
        Ok(matches)
    }
}

/// Compile and expand `pattern` in one step.
///
/// # Errors
/// Returns an error if the pattern is invalid or traversal fails.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>, UtilError> {
    GlobPattern::compile(pattern)?.expand()
}

/// Rejects candidate paths matching any of a list of glob patterns.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<GlobPattern>,
}

impl ExclusionFilter {
    /// Compile every pattern. Patterns that fail to compile are skipped with a
    /// warning and never exclude anything.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            match GlobPattern::compile(pattern.as_ref()) {
                Ok(p) => compiled.push(p),
                Err(e) => warn!("ignoring exclusion: {e}"),
            }
        }
        Self { patterns: compiled }
    }

    /// Build a filter from a comma-separated pattern list.
    pub fn from_csv(list: &str) -> Self {
        Self::new(&split_patterns(list))
    }

    /// `true` if `path` matches at least one exclusion pattern.
    pub fn is_excluded(&self, path: &str) -> bool {
        let normalized = normalize_separators(path);
        self.patterns.iter().any(|p| p.matches(&normalized))
    }

    /// `true` if no usable pattern was supplied.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Split a comma-separated pattern list, trimming entries and dropping empties.
pub fn split_patterns(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

fn normalize_separators(raw: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        raw.to_owned()
    } else {
        raw.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

fn static_root(pattern: &str) -> &str {
    let prefix = match pattern.find(['*', '?']) {
        Some(idx) => pattern.get(..idx).unwrap_or(""),
        None => pattern,
    };
    match prefix.rsplit_once('/') {
        Some(("", _)) if pattern.starts_with('/') => "/",
        Some((dir, _)) => dir,
        None => "",
    }
}

fn compile_segment(raw: &str) -> Segment {
    if raw == "**" {
        return Segment::AnySegments;
    }
    let mut pieces = Vec::new();
    let mut literal = String::new();
    for c in raw.chars() {
        match c {
            '*' | '?' => {
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                let piece = if c == '*' { Piece::Star } else { Piece::Question };
                if piece == Piece::Star && pieces.last() == Some(&Piece::Star) {
                    continue;
                }
                pieces.push(piece);
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Segment::Pieces(pieces)
}

// Both matchers scan left to right. On a mismatch they resume from the most
// recent wildcard with one more unit consumed.

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut resume: Option<(usize, usize)> = None;
    loop {
        match pattern.get(p) {
            Some(Segment::AnySegments) => {
                resume = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some(Segment::Pieces(pieces)) => {
                if path.get(t).is_some_and(|head| match_pieces(pieces, head)) {
                    p += 1;
                    t += 1;
                    continue;
                }
            }
            None if t == path.len() => return true,
            None => {}
        }
        let Some((after_star, consumed)) = resume else {
            return false;
        };
        if consumed >= path.len() {
            return false;
        }
        resume = Some((after_star, consumed + 1));
        p = after_star;
        t = consumed + 1;
    }
}

fn match_pieces(pieces: &[Piece], text: &str) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut resume: Option<(usize, usize)> = None;
    loop {
        let rest = text.get(t..).unwrap_or("");
        match pieces.get(p) {
            Some(Piece::Star) => {
                resume = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some(Piece::Literal(lit)) => {
                if rest.starts_with(lit.as_str()) {
                    p += 1;
                    t += lit.len();
                    continue;
                }
            }
            Some(Piece::Question) => {
                if let Some(c) = rest.chars().next() {
                    p += 1;
                    t += c.len_utf8();
                    continue;
                }
            }
            None if rest.is_empty() => return true,
            None => {}
        }
        let Some((after_star, consumed)) = resume else {
            return false;
        };
        let Some(c) = text.get(consumed..).and_then(|s| s.chars().next()) else {
            return false;
        };
        let next = consumed + c.len_utf8();
        resume = Some((after_star, next));
        p = after_star;
        t = next;
    }
}

fn is_regular_file(entry: &walkdir::DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}
