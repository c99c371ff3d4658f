//! Error types for building and parsing archives.
//!
//! Every failure aborts the whole build or parse; there is no per-entry
//! skip-and-continue, so a caller never sees a partially written buffer.

use thiserror::Error;

/// Result type alias for zippen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the archive core
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The input buffer is not a ZIP stream this decoder understands
    #[error("malformed archive at offset {offset}: {reason}")]
    MalformedInput {
        /// Byte offset where scanning stopped
        offset: usize,
        /// What was wrong with the record
        reason: String,
    },

    /// An entry was rejected before any buffer work
    #[error("invalid entry '{path}': {reason}")]
    InvalidEntry {
        /// Path of the rejected entry
        path: String,
        /// Why the entry cannot be stored
        reason: String,
    },

    /// The compression adapter failed on a payload
    #[error("compression failed for '{path}': {source}")]
    CompressionFailure {
        /// Path of the entry being compressed or decompressed
        path: String,
        /// Underlying adapter error
        #[source]
        source: std::io::Error,
    },

    /// The archive does not fit the 32-bit offsets and 16-bit counts of the format
    #[error("archive too large: {required} exceeds the addressable limit")]
    CapacityOverflow {
        /// Human readable description of the requirement that overflowed
        required: String,
    },
}

impl Error {
    /// Creates a new malformed input error
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a new invalid entry error
    pub fn invalid_entry(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new compression failure
    pub fn compression(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::CompressionFailure {
            path: path.into(),
            source,
        }
    }

    /// Creates a new capacity overflow error
    pub fn capacity(required: impl Into<String>) -> Self {
        Self::CapacityOverflow {
            required: required.into(),
        }
    }

    /// Returns true if the error came from decoding foreign input
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedInput { .. })
    }
}
