//! Per-node append-only hash chain ledger.
//!
//! This crate provides:
//! - [`LedgerEntry`] with `entry_hash = H(seq ‖ timestamp ‖ event_type ‖ payload_hash ‖ prev_hash)`
//! - [`Ledger`], which serializes every append through a single writer so two
//!   concurrent appends can never link to the same tail
//! - Chain verification that names the first broken index
//! - A framed, append-only file format so a node's ledger survives restarts
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ciphera_core::SystemClock;
//! use ciphera_canonical::EventType;
//! use ciphera_ledger::Ledger;
//! use serde_json::json;
//!
//! let ledger = Ledger::in_memory(Arc::new(SystemClock));
//! let revoke = EventType::parse("REVOKE")?;
//! ledger.append(&revoke, &json!({"credential_id": "c1"}))?;
//! ledger.append(&revoke, &json!({"credential_id": "c2"}))?;
//!
//! assert!(ledger.verify(..).is_intact());
//! assert_eq!(ledger.tail().map(|e| e.seq), Some(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The chain is per node; no cross-node order is claimed.

#![deny(missing_docs)]

/// Ledger entries and their hash.
pub mod entry;
/// Error types for ledger operations.
pub mod errors;
/// File header and frame structure.
pub mod frame;
/// The in-process ledger with single-writer appends.
pub mod ledger;
/// Ledger file reader.
pub mod reader;
/// Chain verification.
pub mod verification;
/// Ledger file writer.
pub mod writer;

pub use entry::LedgerEntry;
pub use errors::LedgerError;
pub use frame::{FrameKind, LedgerFileHeader, RecordFrame};
pub use ledger::Ledger;
pub use reader::{LedgerFileReader, ReadMode};
pub use verification::{verify_chain, BreakReason, ChainReport};
pub use writer::{LedgerFileWriter, WriteOptions};
