//! Ledger file writer.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::entry::LedgerEntry;
use crate::errors::LedgerError;
use crate::frame::{FrameKind, LedgerFileHeader, RecordFrame, HEADER_SIZE};

/// Options for ledger file writing.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Whether to fsync after each append (default: true; an ack must follow a durable write).
    pub sync: bool,
    /// Whether to create the file if it doesn't exist (default: true).
    pub create: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sync: true,
            create: true,
        }
    }
}

/// Appends framed entries to a ledger file.
///
/// The writer only appends; it never rewrites an existing frame. The single
/// exception is [`LedgerFileWriter::truncate_to`], used on restart to cut off
/// a frame that was only partially written before a crash, and after a failed
/// append to drop the partial frame. If that rollback fails too the writer is
/// poisoned and every later append returns [`LedgerError::Poisoned`].
pub struct LedgerFileWriter {
    file: File,
    sync: bool,
    poisoned: Option<u64>,
}

impl LedgerFileWriter {
    /// Opens or creates a ledger file, writing the header if the file is empty.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the file cannot be opened or its header is invalid.
    pub fn open<P: AsRef<Path>>(path: P, options: WriteOptions) -> Result<Self, LedgerError> {
        let mut file = OpenOptions::new()
            .create(options.create)
            .read(true)
            .write(true)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.write_all(&LedgerFileHeader::default().encode())?;
            file.flush()?;
            if options.sync {
                file.sync_all()?;
            }
        } else {
            let mut header = [0u8; HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header).map_err(|_| {
                LedgerError::InvalidHeader(format!("file too short for header: {} bytes", len))
            })?;
            LedgerFileHeader::decode(&header)?;
            file.seek(SeekFrom::End(0))?;
        }

        Ok(Self {
            file,
            sync: options.sync,
            poisoned: None,
        })
    }

    /// Drops every byte after `len` and positions the writer there.
    pub fn truncate_to(&mut self, len: u64) -> Result<(), LedgerError> {
        let len = len.max(HEADER_SIZE as u64);
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Appends one entry as an `Entry` frame.
    pub fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let payload = serde_json::to_vec(entry)?;
        self.append_raw(FrameKind::Entry, &payload)
    }

    /// Appends a raw frame.
    ///
    /// On a failed write the file is cut back to its length before the call,
    /// so no partial frame is left in front of later appends.
    pub fn append_raw(&mut self, kind: FrameKind, payload: &[u8]) -> Result<(), LedgerError> {
        if let Some(offset) = self.poisoned {
            return Err(LedgerError::Poisoned { offset });
        }
        let frame = RecordFrame::new(kind, payload.len())?;
        let mut buf = Vec::with_capacity(frame.encode().len() + payload.len());
        buf.extend_from_slice(&frame.encode());
        buf.extend_from_slice(payload);

        let offset = self.file.stream_position()?;
        if let Err(e) = self.write_frame(&buf) {
            if self.truncate_to(offset).is_err() {
                self.poisoned = Some(offset);
            }
            return Err(e);
        }
        Ok(())
    }

    fn write_frame(&mut self, buf: &[u8]) -> Result<(), LedgerError> {
        self.file.write_all(buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Whether a failed rollback has disabled appends.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> Result<(), LedgerError> {
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}
