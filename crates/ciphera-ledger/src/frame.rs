//! On-disk layout.
//!
//! A ledger file is a 16-byte header followed by frames. Each frame is an
//! 8-byte header (kind, three reserved zero bytes, little-endian payload
//! length) and the payload: one JSON-encoded [`LedgerEntry`](crate::LedgerEntry).

use crate::errors::LedgerError;

/// Ledger file magic bytes: `b"CLG1"`.
pub const MAGIC: &[u8; 4] = b"CLG1";

/// Current file format version.
pub const VERSION: u16 = 0x0001;

/// File header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Maximum frame payload: 16 MiB.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

const FRAME_KIND_ENTRY: u8 = 0x01;

/// Ledger file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerFileHeader {
    /// Format version.
    pub version: u16,
}

impl Default for LedgerFileHeader {
    fn default() -> Self {
        Self { version: VERSION }
    }
}

impl LedgerFileHeader {
    /// Encodes the header; flags and reserved bytes are zero.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes
    }

    /// Decodes and validates a header.
    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        let Some(bytes) = bytes.get(..HEADER_SIZE) else {
            return Err(LedgerError::InvalidHeader(format!(
                "header too short: {} bytes",
                bytes.len()
            )));
        };
        if &bytes[0..4] != MAGIC {
            return Err(LedgerError::InvalidHeader(format!(
                "invalid magic: {:?}",
                &bytes[0..4]
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(LedgerError::InvalidHeader(format!(
                "unsupported version: 0x{:04x}",
                version
            )));
        }
        if bytes[6..].iter().any(|b| *b != 0) {
            return Err(LedgerError::InvalidHeader(
                "non-zero flags or reserved bytes".to_string(),
            ));
        }
        Ok(Self { version })
    }
}

/// Frame payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A JSON-encoded ledger entry.
    Entry,
    /// Unknown kind; skipped by readers.
    Unknown(u8),
}

impl From<u8> for FrameKind {
    fn from(byte: u8) -> Self {
        match byte {
            FRAME_KIND_ENTRY => FrameKind::Entry,
            other => FrameKind::Unknown(other),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Entry => FRAME_KIND_ENTRY,
            FrameKind::Unknown(b) => b,
        }
    }
}

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFrame {
    /// Payload kind.
    pub kind: FrameKind,
    /// Payload length in bytes.
    pub len: u32,
}

impl RecordFrame {
    /// Creates a frame header, enforcing the payload limit.
    pub fn new(kind: FrameKind, len: usize) -> Result<Self, LedgerError> {
        if len > MAX_PAYLOAD_SIZE as usize {
            return Err(LedgerError::PayloadTooLarge {
                size: len as u64,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            kind,
            len: len as u32,
        })
    }

    /// Encodes the frame header.
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        bytes[0] = self.kind.into();
        bytes[4..8].copy_from_slice(&self.len.to_le_bytes());
        bytes
    }

    /// Decodes a frame header found at `offset`.
    pub fn decode(bytes: &[u8; FRAME_HEADER_SIZE], offset: u64) -> Result<Self, LedgerError> {
        if bytes[1..4] != [0u8; 3] {
            return Err(LedgerError::InvalidFrame {
                offset,
                reason: "non-zero reserved bytes".to_string(),
            });
        }
        let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if len > MAX_PAYLOAD_SIZE {
            return Err(LedgerError::InvalidFrame {
                offset,
                reason: format!("payload size {} exceeds maximum {}", len, MAX_PAYLOAD_SIZE),
            });
        }
        Ok(Self {
            kind: FrameKind::from(bytes[0]),
            len,
        })
    }
}
