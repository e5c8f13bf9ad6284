use std::ops::{Bound, RangeBounds};
use std::path::Path;

use ciphera_canonical::{Digest, EventType};
use ciphera_core::SharedClock;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entry::LedgerEntry;
use crate::errors::LedgerError;
use crate::reader::{LedgerFileReader, ReadMode};
use crate::verification::{verify_chain, ChainReport};
use crate::writer::{LedgerFileWriter, WriteOptions};

/// A node's append-only audit chain.
///
/// Appends are serialized through a single writer lock held across reading
/// the tail, sealing the entry, the durable write and publication, so two
/// concurrent appends can never share a `prev_hash`. Readers see an entry
/// only once it is fully written.
pub struct Ledger {
    entries: RwLock<Vec<LedgerEntry>>,
    writer: Mutex<Option<LedgerFileWriter>>,
    clock: SharedClock,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("len", &self.len())
            .field("durable", &self.writer.lock().is_some())
            .finish()
    }
}

impl Ledger {
    /// A ledger held only in memory.
    pub fn in_memory(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            writer: Mutex::new(None),
            clock,
        }
    }

    /// Opens a file-backed ledger, replaying and verifying existing entries.
    ///
    /// A frame cut short by a crash is dropped from the file. A chain that
    /// fails verification is reported as [`LedgerError::ChainBroken`] and left
    /// untouched on disk.
    pub fn open<P: AsRef<Path>>(
        path: P,
        clock: SharedClock,
        options: WriteOptions,
    ) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let existing = path.metadata().map(|m| m.len() > 0).unwrap_or(false);

        let (entries, valid_len) = if existing {
            let mut reader = LedgerFileReader::open(path, ReadMode::Permissive)?;
            let entries = reader.read_all()?;
            if reader.position() < reader.file_len() {
                warn!(
                    path = %path.display(),
                    valid_len = reader.position(),
                    file_len = reader.file_len(),
                    "dropping truncated ledger tail"
                );
            }
            (entries, Some((reader.position(), reader.file_len())))
        } else {
            (Vec::new(), None)
        };

        if let ChainReport::Broken { index, reason } =
            verify_chain(&entries, &Digest::genesis(), 0)
        {
            return Err(LedgerError::ChainBroken { index, reason });
        }

        let mut writer = LedgerFileWriter::open(path, options)?;
        if let Some((valid, total)) = valid_len {
            if valid < total {
                writer.truncate_to(valid)?;
            }
        }

        info!(path = %path.display(), entries = entries.len(), "ledger opened");
        Ok(Self {
            entries: RwLock::new(entries),
            writer: Mutex::new(Some(writer)),
            clock,
        })
    }

    /// Appends an entry for `payload`.
    pub fn append(&self, event_type: &EventType, payload: &Value) -> Result<LedgerEntry, LedgerError> {
        self.append_with(event_type, payload, |_| ()).map(|(entry, ())| entry)
    }

    /// Appends an entry and runs `commit` before the entry becomes visible.
    ///
    /// `commit` runs inside the writer critical section after the entry has
    /// been durably written. Callers use it to apply the state change the
    /// entry records, so the two are observed together. If sealing or writing
    /// fails, `commit` is not run.
    pub fn append_with<F, T>(
        &self,
        event_type: &EventType,
        payload: &Value,
        commit: F,
    ) -> Result<(LedgerEntry, T), LedgerError>
    where
        F: FnOnce(&LedgerEntry) -> T,
    {
        let mut writer = self.writer.lock();

        let (seq, prev_hash) = {
            let entries = self.entries.read();
            match entries.last() {
                Some(tail) => (tail.seq + 1, tail.entry_hash.clone()),
                None => (0, Digest::genesis()),
            }
        };
        let entry = LedgerEntry::seal(
            seq,
            self.clock.now(),
            event_type.clone(),
            payload.clone(),
            prev_hash,
        )?;

        if let Some(file) = writer.as_mut() {
            file.append_entry(&entry)?;
        }

        let output = commit(&entry);
        self.entries.write().push(entry.clone());
        drop(writer);

        debug!(seq = entry.seq, event_type = %entry.event_type, "ledger append");
        Ok((entry, output))
    }

    /// Verifies the entries whose `seq` falls in `range`.
    ///
    /// The first entry of the range is checked against its stored
    /// predecessor, so a sub-range reports the same first broken index as a
    /// full scan would within it.
    pub fn verify<R: RangeBounds<u64>>(&self, range: R) -> ChainReport {
        let entries = self.entries.read();
        let (start, end) = resolve(&range, entries.len());
        let anchor = match start.checked_sub(1) {
            Some(prev) => entries[prev].entry_hash.clone(),
            None => Digest::genesis(),
        };
        verify_chain(&entries[start..end], &anchor, start as u64)
    }

    /// Last appended entry.
    pub fn tail(&self) -> Option<LedgerEntry> {
        self.entries.read().last().cloned()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copies out the entries whose `seq` falls in `range`.
    pub fn entries<R: RangeBounds<u64>>(&self, range: R) -> Vec<LedgerEntry> {
        let entries = self.entries.read();
        let (start, end) = resolve(&range, entries.len());
        entries[start..end].to_vec()
    }

    /// Entries of one event type, in chain order.
    pub fn entries_of(&self, event_type: &EventType) -> Vec<LedgerEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| &e.event_type == event_type)
            .cloned()
            .collect()
    }
}

fn resolve<R: RangeBounds<u64>>(range: &R, len: usize) -> (usize, usize) {
    let len = len as u64;
    let start = match range.start_bound() {
        Bound::Included(s) => *s,
        Bound::Excluded(s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(e) => e.saturating_add(1),
        Bound::Excluded(e) => *e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    let start = start.min(end);
    (start as usize, end as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciphera_core::SystemClock;
    use serde_json::json;
    use std::sync::Arc;

    fn revoke() -> EventType {
        EventType::parse("REVOKE").unwrap()
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let ledger = Ledger::in_memory(Arc::new(SystemClock));
        let entry = ledger.append(&revoke(), &json!({"credential_id": "c1"})).unwrap();
        assert_eq!(entry.seq, 0);
        assert_eq!(entry.prev_hash, Digest::genesis());
        let next = ledger.append(&revoke(), &json!({"credential_id": "c2"})).unwrap();
        assert_eq!(next.prev_hash, entry.entry_hash);
    }

    #[test]
    fn commit_output_is_returned() {
        let ledger = Ledger::in_memory(Arc::new(SystemClock));
        let (entry, seen) = ledger
            .append_with(&revoke(), &json!({}), |e| e.seq)
            .unwrap();
        assert_eq!(seen, entry.seq);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn sub_range_verification() {
        let ledger = Ledger::in_memory(Arc::new(SystemClock));
        for i in 0..6 {
            ledger.append(&revoke(), &json!({"i": i})).unwrap();
        }
        assert_eq!(ledger.verify(2..4), ChainReport::Intact { checked: 2 });
        assert_eq!(ledger.verify(4..=100), ChainReport::Intact { checked: 2 });
        assert_eq!(ledger.entries(1..3).len(), 2);
        assert_eq!(ledger.entries(10..).len(), 0);
    }

    #[test]
    fn concurrent_appends_form_one_chain() {
        let ledger = Arc::new(Ledger::in_memory(Arc::new(SystemClock)));
        std::thread::scope(|scope| {
            for t in 0..8 {
                let ledger = Arc::clone(&ledger);
                scope.spawn(move || {
                    for i in 0..50 {
                        ledger
                            .append(&revoke(), &json!({"thread": t, "i": i}))
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(ledger.len(), 400);
        assert_eq!(ledger.verify(..), ChainReport::Intact { checked: 400 });
        let entries = ledger.entries(..);
        let mut prevs: Vec<_> = entries.iter().map(|e| e.prev_hash.b64.clone()).collect();
        prevs.sort();
        prevs.dedup();
        assert_eq!(prevs.len(), 400);
    }
}
