//! Chain verification.

use std::fmt;

use ciphera_canonical::Digest;
use serde::Serialize;

use crate::entry::LedgerEntry;

/// Why a chain link failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    /// `seq` does not follow its predecessor.
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Sequence number found.
        found: u64,
    },
    /// `prev_hash` does not equal the predecessor's `entry_hash`.
    PrevHashMismatch,
    /// Stored `entry_hash` differs from the recomputed one.
    EntryHashMismatch,
    /// Stored payload does not hash to `payload_hash`.
    PayloadHashMismatch,
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakReason::SequenceGap { expected, found } => {
                write!(f, "sequence gap (expected {}, found {})", expected, found)
            }
            BreakReason::PrevHashMismatch => write!(f, "prev_hash does not link to predecessor"),
            BreakReason::EntryHashMismatch => write!(f, "entry_hash mismatch"),
            BreakReason::PayloadHashMismatch => write!(f, "payload_hash mismatch"),
        }
    }
}

/// Outcome of a verification query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainReport {
    /// Every checked entry links and hashes correctly.
    Intact {
        /// Number of entries checked.
        checked: u64,
    },
    /// The chain breaks at `index`.
    Broken {
        /// First broken index (entry `seq`).
        index: u64,
        /// What failed.
        reason: BreakReason,
    },
}

impl ChainReport {
    /// Whether no break was found.
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainReport::Intact { .. })
    }

    /// First broken index, if any.
    pub fn broken_index(&self) -> Option<u64> {
        match self {
            ChainReport::Intact { .. } => None,
            ChainReport::Broken { index, .. } => Some(*index),
        }
    }
}

/// Verifies `entries` as a contiguous chain segment.
///
/// `anchor` is the `entry_hash` the first entry must link to (the genesis
/// digest for a chain starting at 0), and `first_seq` its expected sequence.
pub fn verify_chain(entries: &[LedgerEntry], anchor: &Digest, first_seq: u64) -> ChainReport {
    let mut prev = anchor;
    let mut expected = first_seq;
    for entry in entries {
        if entry.seq != expected {
            return ChainReport::Broken {
                index: expected,
                reason: BreakReason::SequenceGap {
                    expected,
                    found: entry.seq,
                },
            };
        }
        let broken = |reason| ChainReport::Broken {
            index: entry.seq,
            reason,
        };
        if &entry.prev_hash != prev {
            return broken(BreakReason::PrevHashMismatch);
        }
        match entry.recompute_payload_hash() {
            Ok(hash) if hash == entry.payload_hash => {}
            _ => return broken(BreakReason::PayloadHashMismatch),
        }
        if entry.recompute_hash() != entry.entry_hash {
            return broken(BreakReason::EntryHashMismatch);
        }
        prev = &entry.entry_hash;
        expected += 1;
    }
    ChainReport::Intact {
        checked: entries.len() as u64,
    }
}
