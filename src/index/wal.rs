//! Write-ahead log of index mutations.
//!
//! Every add and delete is appended here before it is applied to the
//! in-memory segments, and the log is truncated once a commit has made the
//! segments durable. On open, the remaining records are replayed.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::document::IndexDocument;
use crate::error::Result;
use crate::query::Query;
use crate::storage::{Storage, StorageOutput};

pub type SeqNumber = u64;

/// File name of the log inside the index area.
pub const WAL_FILE: &str = "index.wal";

/// A single logged mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    /// Add a document.
    Add { document: IndexDocument },
    /// Delete every document containing `field:term`.
    DeleteTerm { field: String, term: String },
    /// Delete every document matching a query.
    DeleteQuery { query: Query },
}

/// A wrapper for WAL entry with sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub seq: SeqNumber,
    pub entry: WalEntry,
}

#[derive(Debug)]
pub struct WalManager {
    storage: Arc<dyn Storage>,
    path: String,
    writer: Mutex<Option<Box<dyn StorageOutput>>>,
    next_seq: AtomicU64,
}

impl WalManager {
    pub fn new(storage: Arc<dyn Storage>, path: &str) -> Self {
        WalManager {
            storage,
            path: path.to_string(),
            writer: Mutex::new(None),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Get the last used sequence number.
    pub fn last_seq(&self) -> SeqNumber {
        self.next_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Number the next records after `seq`, which a commit has already
    /// covered.
    pub fn advance_past(&self, seq: SeqNumber) {
        self.next_seq.fetch_max(seq + 1, Ordering::SeqCst);
    }

    /// Append an entry and sync it. Returns the assigned sequence number.
    ///
    /// Record format: `[length: u32 LE][JSON bytes]`.
    pub fn append(&self, entry: &WalEntry) -> Result<SeqNumber> {
        let mut writer = self.writer.lock();
        if writer.is_none() {
            *writer = Some(self.storage.create_output_append(&self.path)?);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = WalRecord {
            seq,
            entry: entry.clone(),
        };
        let bytes = serde_json::to_vec(&record)?;

        if let Some(output) = writer.as_mut() {
            output.write_all(&(bytes.len() as u32).to_le_bytes())?;
            output.write_all(&bytes)?;
            output.flush_and_sync()?;
        }
        Ok(seq)
    }

    /// Read every complete record. A torn record at the tail is ignored.
    pub fn read_all(&self) -> Result<Vec<WalRecord>> {
        if !self.storage.file_exists(&self.path) {
            return Ok(Vec::new());
        }

        let mut reader = self.storage.open_input(&self.path)?;
        let size = reader.size()?;
        let mut records = Vec::new();
        let mut position = 0u64;
        let mut max_seq = 0;

        while position + 4 <= size {
            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            let len = u32::from_le_bytes(len_bytes) as u64;
            position += 4;
            if position + len > size {
                break;
            }

            let mut buffer = vec![0u8; len as usize];
            reader.read_exact(&mut buffer)?;
            position += len;

            let record: WalRecord = serde_json::from_slice(&buffer)?;
            max_seq = max_seq.max(record.seq);
            records.push(record);
        }

        if max_seq >= self.next_seq.load(Ordering::SeqCst) {
            self.next_seq.store(max_seq + 1, Ordering::SeqCst);
        }
        Ok(records)
    }

    /// Clear the log after a successful commit.
    pub fn truncate(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        *writer = None;
        let mut output = self.storage.create_output(&self.path)?;
        output.close()?;
        Ok(())
    }
}
