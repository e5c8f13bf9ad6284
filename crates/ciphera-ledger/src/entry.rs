use chrono::{DateTime, Utc};
use ciphera_canonical::{content_hash, hash_with_domain, Digest, EventType, HashError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Domain separator for entry hashes: `b"ciphera:ledger:v1\0"`.
const ENTRY_DOMAIN_SEPARATOR: &[u8] = b"ciphera:ledger:v1\0";

/// Domain separator for payload hashes: `b"ciphera:payload:v1\0"`.
const PAYLOAD_DOMAIN_SEPARATOR: &[u8] = b"ciphera:payload:v1\0";

/// One link of the hash chain.
///
/// The payload is kept next to its hash for inspection; only `payload_hash`
/// participates in `entry_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the chain, starting at 0.
    pub seq: u64,
    /// Append time.
    pub timestamp: DateTime<Utc>,
    /// Event type (`REVOKE`, `SESSION_OPEN`, ...).
    pub event_type: EventType,
    /// Hash of the canonical payload JSON.
    pub payload_hash: Digest,
    /// `entry_hash` of the previous entry, or the genesis digest.
    pub prev_hash: Digest,
    /// Hash committing to all fields above.
    pub entry_hash: Digest,
    /// The payload itself.
    pub payload: Value,
}

impl LedgerEntry {
    /// Builds an entry and computes both hashes.
    pub fn seal(
        seq: u64,
        timestamp: DateTime<Utc>,
        event_type: EventType,
        payload: Value,
        prev_hash: Digest,
    ) -> Result<Self, HashError> {
        let payload_hash = hash_payload(&payload)?;
        let entry_hash = compute_entry_hash(seq, &timestamp, &event_type, &payload_hash, &prev_hash);
        Ok(Self {
            seq,
            timestamp,
            event_type,
            payload_hash,
            prev_hash,
            entry_hash,
            payload,
        })
    }

    /// Recomputes `entry_hash` from the stored fields.
    pub fn recompute_hash(&self) -> Digest {
        compute_entry_hash(
            self.seq,
            &self.timestamp,
            &self.event_type,
            &self.payload_hash,
            &self.prev_hash,
        )
    }

    /// Recomputes `payload_hash` from the stored payload.
    pub fn recompute_payload_hash(&self) -> Result<Digest, HashError> {
        hash_payload(&self.payload)
    }
}

/// Hash of a payload as recorded in `payload_hash`.
pub fn hash_payload(payload: &Value) -> Result<Digest, HashError> {
    content_hash(PAYLOAD_DOMAIN_SEPARATOR, payload)
}

/// `H(domain ‖ seq ‖ timestamp ‖ event_type ‖ payload_hash ‖ prev_hash)`.
///
/// Integers are big-endian; text fields are prefixed with their u32 length.
pub fn compute_entry_hash(
    seq: u64,
    timestamp: &DateTime<Utc>,
    event_type: &EventType,
    payload_hash: &Digest,
    prev_hash: &Digest,
) -> Digest {
    let mut buf = Vec::with_capacity(160);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&timestamp.timestamp().to_be_bytes());
    buf.extend_from_slice(&timestamp.timestamp_subsec_nanos().to_be_bytes());
    push_text(&mut buf, event_type.as_str());
    push_text(&mut buf, &payload_hash.b64);
    push_text(&mut buf, &prev_hash.b64);
    hash_with_domain(ENTRY_DOMAIN_SEPARATOR, &buf)
}

fn push_text(buf: &mut Vec<u8>, text: &str) {
    buf.extend_from_slice(&(text.len() as u32).to_be_bytes());
    buf.extend_from_slice(text.as_bytes());
}
