//! Error types for buildtrail-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A glob pattern could not be compiled.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    GlobPattern { pattern: String, message: String },

    /// Walking the static root of a glob pattern failed.
    #[error("cannot walk {root} for pattern `{pattern}`: {message}")]
    Walk {
        root: String,
        pattern: String,
        message: String,
    },

    /// A command failed to execute.
    #[error("cannot execute command: {source}")]
    CommandExec { source: std::io::Error },

    /// A Maven project descriptor is not well-formed XML.
    #[error("cannot parse project descriptor {path}: {message}")]
    DescriptorParse { path: String, message: String },

    /// A Maven project descriptor lacks coordinate fields even after parent fallback.
    #[error("project descriptor {path} is missing {missing}")]
    DescriptorIncomplete { path: String, missing: String },
}
