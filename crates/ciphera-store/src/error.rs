use ciphera_canonical::{CredentialId, HashError};
use ciphera_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Unknown credential.
    #[error("credential not found: {0}")]
    NotFound(CredentialId),
    /// A different credential is already stored under this id.
    #[error("credential {0} already stored with different content")]
    Conflict(CredentialId),
    /// The credential's content hash does not match its fields.
    #[error("credential {0} has an invalid content hash")]
    ContentHashMismatch(CredentialId),
    /// Ledger append failed; the store was not changed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    /// Ledger payload could not be built.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Content hash could not be computed.
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}
