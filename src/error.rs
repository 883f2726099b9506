use std::path::PathBuf;
use thiserror::Error;

/// Rejections of a caller-supplied document record before it reaches the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("owner name is required")]
    MissingOwner,

    #[error("a document attachment is required")]
    MissingAttachment,

    #[error("file type not allowed: {0} (allowed: pdf, png, jpg, jpeg, doc, docx)")]
    DisallowedExtension(String),

    #[error("attachment content is not valid base64: {0}")]
    InvalidAttachment(String),

    #[error("unknown record type: {0}")]
    UnknownRecordType(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("Ledger storage is corrupt at {}: {reason}", path.display())]
    StorageCorrupt { path: PathBuf, reason: String },

    #[error("No record with identifier {0}")]
    NotFound(String),

    #[error("Malformed identifier {0:?}: expected 12 digits")]
    MalformedIdentifier(String),

    #[error("Ledger changed underneath us: expected tail {expected:?}, found {found:?}")]
    ConcurrentModification { expected: String, found: String },

    #[error("Ledger is locked by another writer: {}", .0.display())]
    Locked(PathBuf),

    #[error("Could not allocate a free identifier after {0} attempts")]
    IdentifierExhausted(u32),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
