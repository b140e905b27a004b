//! Local persistence.
//!
//! This module provides the storage layer for finmail:
//!
//! - Timestamped JSON artifact files for fetched emails and extracted records
//! - One JSON file per user profile
//!
//! Writes are append-only by filename for artifacts and last-writer-wins for
//! profiles. There are no locks or transactions; concurrent runs can race on
//! directory listings but never corrupt a single file.

mod files;
mod profiles;

pub use files::{
    DumpMetadata, EmailDump, FileStore, RecordDump, StoredFileEntry, StoredFileKind,
};
pub use profiles::{NewProfile, ProfileStore};

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Required user input was missing or malformed. Raised before any write
    /// is attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),
}
