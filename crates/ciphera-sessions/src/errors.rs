use ciphera_canonical::SessionId;
use ciphera_ledger::LedgerError;
use thiserror::Error;

/// Errors returned by the session registry.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Unknown session id.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// Session hit its idle or absolute timeout.
    #[error("session expired: {0}")]
    Expired(SessionId),

    /// Session ended because its credential was revoked.
    #[error("session revoked: {0}")]
    Revoked(SessionId),

    /// Audit append failed; the session was not changed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Audit payload could not be built.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether the caller should treat the session as absent and re-authenticate.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            SessionError::NotFound(_) | SessionError::Expired(_) | SessionError::Revoked(_)
        )
    }
}
