//! Cache error types
//!
//! Reads never fail past initialization: corrupt, expired and unreadable
//! entries are reported as misses. Only initialization and writes surface
//! errors to the caller.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache directory could not be created or is not writable.
    /// Memoized: every call after the first failure reports the same error.
    #[error("Failed to initialize Figma cache: cannot use directory {}: {reason}", dir.display())]
    Init { dir: PathBuf, reason: String },

    /// Writing or renaming the entry failed; the temp file has been removed
    #[error("Figma cache write failed for {file_key}: {source}")]
    Write {
        file_key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize cache entry for {file_key}: {reason}")]
    Serialize { file_key: String, reason: String },
}
