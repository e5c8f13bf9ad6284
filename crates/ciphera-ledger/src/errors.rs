use thiserror::Error;

use crate::verification::BreakReason;

/// Errors that can occur during ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid file header (magic, version, flags or reserved bytes).
    #[error("invalid ledger header: {0}")]
    InvalidHeader(String),
    /// Invalid frame structure.
    #[error("invalid frame at offset {offset}: {reason}")]
    InvalidFrame {
        /// Byte offset where the frame starts.
        offset: u64,
        /// Reason for invalidity.
        reason: String,
    },
    /// Serialized entry exceeds the frame size limit.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size.
        size: u64,
        /// Maximum allowed size.
        max: u32,
    },
    /// Entry JSON could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Truncated frame detected in strict mode.
    #[error("truncated frame at offset {offset}")]
    TruncatedFrame {
        /// Byte offset where truncation occurred.
        offset: u64,
    },
    /// Payload could not be hashed.
    #[error("payload hashing failed: {0}")]
    Hash(#[from] ciphera_canonical::HashError),
    /// A persisted chain failed verification. Never repaired automatically.
    #[error("ledger chain broken at index {index}: {reason}")]
    ChainBroken {
        /// First broken index.
        index: u64,
        /// What failed.
        reason: BreakReason,
    },
    /// An earlier failed write could not be rolled back; the writer refuses further appends.
    #[error("ledger writer poisoned at offset {offset}")]
    Poisoned {
        /// File length the writer last knew to be valid.
        offset: u64,
    },
}
