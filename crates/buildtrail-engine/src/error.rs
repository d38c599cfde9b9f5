//! Error types for buildtrail-engine.

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] buildtrail_util::error::UtilError),

    /// A file spec could not be loaded.
    #[error("{0}")]
    FileSpec(#[from] buildtrail_config::filespec::FileSpecError),

    /// The operation needs a build name and number.
    #[error("build name and number are required to {operation}")]
    UntrackedBuild { operation: &'static str },

    /// Dependency collection was invoked without any pattern source.
    #[error("dependency collection requires a pattern or a file spec")]
    NoPatterns,

    /// Persisted build metadata could not be serialized or deserialized.
    #[error("cannot process build metadata: {message}")]
    Metadata { message: String },

    /// The remote repository rejected or failed a request.
    #[error("remote repository error: {message}")]
    Remote { message: String },
}
