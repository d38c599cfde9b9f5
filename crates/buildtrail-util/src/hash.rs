//! Content checksums for dependencies and artifacts, plus cache-key hashing.

use std::io::Read;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::UtilError;

/// The three digests recorded for every file, as lowercase hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha1: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub md5: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
}

impl Checksums {
    /// Build from externally supplied hex digests, normalizing case.
    pub fn from_hex(sha1: &str, md5: &str, sha256: &str) -> Self {
        Self {
            sha1: sha1.trim().to_ascii_lowercase(),
            md5: md5.trim().to_ascii_lowercase(),
            sha256: sha256.trim().to_ascii_lowercase(),
        }
    }

    /// `true` if no digest is known.
    pub fn is_empty(&self) -> bool {
        self.sha1.is_empty() && self.md5.is_empty() && self.sha256.is_empty()
    }
}

/// Compute SHA-1, MD5 and SHA-256 of a file in a single streaming pass.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn checksum_file(path: &Path) -> Result<Checksums, UtilError> {
    let file = std::fs::File::open(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = std::io::BufReader::new(file);
    let mut sha1 = Sha1::new();
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if n == 0 {
            break;
        }
        let Some(chunk) = buf.get(..n) else {
            break; // unreachable: n is bounded by buf.len()
        };
        sha1.update(chunk);
        md5.update(chunk);
        sha256.update(chunk);
    }
    Ok(Checksums {
        sha1: format!("{:x}", sha1.finalize()),
        md5: format!("{:x}", md5.finalize()),
        sha256: format!("{:x}", sha256.finalize()),
    })
}

/// Combine multiple string parts into a single composite SHA-256 hash.
///
/// Each part is hashed in order with a length prefix to prevent ambiguity.
pub fn sha256_multi(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        // Length-prefix each part to avoid collisions like ["ab","c"] vs ["a","bc"].
        hasher.update(part.len().to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
