use ciphera_canonical::{EventId, NodeId};
use ciphera_ledger::BreakReason;
use thiserror::Error;

/// Failures reported by CLI commands beyond I/O and parse errors.
#[derive(Error, Debug)]
pub enum CliError {
    /// Ledger chain verification failed.
    #[error("ledger chain broken at entry {index}: {reason}")]
    ChainBroken {
        /// First broken entry.
        index: u64,
        /// What failed.
        reason: BreakReason,
    },

    /// A simulated revocation did not reach every node in time.
    #[error("revocation {event_id} did not converge; pending: {pending:?}")]
    NotConverged {
        /// The revocation.
        event_id: EventId,
        /// Nodes that had not acknowledged.
        pending: Vec<NodeId>,
    },

    /// The simulated gateway answered differently than expected.
    #[error("simulation step {step} failed: {detail}")]
    Unexpected {
        /// Step name.
        step: &'static str,
        /// What was returned.
        detail: String,
    },
}
