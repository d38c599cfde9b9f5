//! Parse file-spec documents and `buildtrail.toml` step settings.

pub mod filespec;
pub mod settings;

pub use filespec::{FileSpec, FileSpecEntry};
pub use settings::Settings;
