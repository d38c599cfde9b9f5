#![forbid(unsafe_code)]
//! Glob matching, checksums, Maven descriptors, and process helpers for buildtrail.

pub mod error;
pub mod fs;
pub mod glob;
pub mod hash;
pub mod maven;
pub mod process;
