//! Ledger file reader.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::entry::LedgerEntry;
use crate::errors::LedgerError;
use crate::frame::{FrameKind, LedgerFileHeader, RecordFrame, FRAME_HEADER_SIZE, HEADER_SIZE};

/// Read mode for handling truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Truncated frames are errors.
    Strict,
    /// A truncated final frame is treated as end-of-file.
    Permissive,
}

/// Sequential reader over a ledger file.
///
/// # Example
///
/// ```rust,no_run
/// use ciphera_ledger::{LedgerFileReader, ReadMode};
///
/// let mut reader = LedgerFileReader::open("node1.clg", ReadMode::Strict)?;
/// while let Some(entry) = reader.read_entry()? {
///     println!("{} {}", entry.seq, entry.event_type);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct LedgerFileReader {
    reader: BufReader<File>,
    mode: ReadMode,
    position: u64,
    file_len: u64,
}

impl LedgerFileReader {
    /// Opens a ledger file and validates its header.
    pub fn open<P: AsRef<Path>>(path: P, mode: ReadMode) -> Result<Self, LedgerError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).map_err(|_| {
            LedgerError::InvalidHeader(format!("file too short for header: {} bytes", file_len))
        })?;
        LedgerFileHeader::decode(&header)?;
        Ok(Self {
            reader,
            mode,
            position: HEADER_SIZE as u64,
            file_len,
        })
    }

    /// Offset just past the last complete frame read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total file length at open time.
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Reads the next frame; `Ok(None)` at end-of-file.
    pub fn read_frame(&mut self) -> Result<Option<(FrameKind, Vec<u8>)>, LedgerError> {
        if self.position >= self.file_len {
            return Ok(None);
        }
        let start = self.position;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        if let Err(e) = self.reader.read_exact(&mut header) {
            return self.truncated(e, start);
        }
        let frame = RecordFrame::decode(&header, start)?;

        let mut payload = vec![0u8; frame.len as usize];
        if let Err(e) = self.reader.read_exact(&mut payload) {
            return self.truncated(e, start);
        }

        self.position = start + FRAME_HEADER_SIZE as u64 + frame.len as u64;
        Ok(Some((frame.kind, payload)))
    }

    fn truncated<T>(&self, err: io::Error, offset: u64) -> Result<Option<T>, LedgerError> {
        if err.kind() != io::ErrorKind::UnexpectedEof {
            return Err(err.into());
        }
        match self.mode {
            ReadMode::Permissive => Ok(None),
            ReadMode::Strict => Err(LedgerError::TruncatedFrame { offset }),
        }
    }

    /// Reads the next ledger entry, skipping unknown frame kinds.
    pub fn read_entry(&mut self) -> Result<Option<LedgerEntry>, LedgerError> {
        loop {
            match self.read_frame()? {
                None => return Ok(None),
                Some((FrameKind::Entry, payload)) => {
                    return Ok(Some(serde_json::from_slice(&payload)?));
                }
                Some((FrameKind::Unknown(_), _)) => continue,
            }
        }
    }

    /// Reads every remaining entry.
    pub fn read_all(&mut self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
