//! Single-owner index writer with near-real-time snapshots.
//!
//! Every mutation is first appended to the write-ahead log and then applied
//! to the in-memory state, both under the writer lock, so the log never
//! holds a record the segments have not seen. Added documents go to a
//! pending segment which a snapshot seals, making them searchable at once.
//!
//! A commit makes the state durable in this order:
//!
//! 1. new segments and changed deletion sets
//! 2. the facet taxonomy
//! 3. `segments.json`, which names the segments and the sequence number of
//!    the last logged mutation they contain
//! 4. the log is truncated
//!
//! The manifest is the commit point. When a commit fails before it, the
//! previous manifest and the full log are replayed on open; when it fails
//! after it, records already covered by the manifest are skipped. Either
//! way every logged document is applied exactly once.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taxis::analysis::StandardAnalyzer;
//! use taxis::document::IndexDocument;
//! use taxis::index::facets_config::FacetsConfig;
//! use taxis::index::writer::{IndexWriter, WriterConfig};
//! use taxis::storage::{MemoryStorage, PrefixedStorage, Storage};
//!
//! # fn main() -> taxis::error::Result<()> {
//! let root: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
//! let writer = IndexWriter::open(
//!     Arc::new(PrefixedStorage::new("index", root.clone())),
//!     Arc::new(PrefixedStorage::new("facet", root)),
//!     Arc::new(StandardAnalyzer::new()),
//!     Arc::new(FacetsConfig::new()),
//!     WriterConfig::default(),
//! )?;
//! writer.add(IndexDocument::new())?;
//! assert_eq!(writer.snapshot().num_docs(), 1);
//! writer.commit()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bit_vec::BitVec;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::analysis::Analyzer;
use crate::document::IndexDocument;
use crate::error::{Result, TaxisError};
use crate::index::facets_config::FacetsConfig;
use crate::index::segment::{LocalDocId, Segment};
use crate::index::snapshot::{DocId, IndexSnapshot};
use crate::index::taxonomy::Taxonomy;
use crate::index::wal::{SeqNumber, WAL_FILE, WalEntry, WalManager};
use crate::query::{Matcher, Query};
use crate::storage::{Storage, read_blob, read_json, write_blob, write_json};

/// Manifest listing the committed segments.
pub const MANIFEST_FILE: &str = "segments.json";

const SEGMENT_PREFIX: &str = "seg_";

fn segment_file(id: u64) -> String {
    format!("{SEGMENT_PREFIX}{id:06}.bin")
}

fn deletions_file(id: u64) -> String {
    format!("{SEGMENT_PREFIX}{id:06}.del")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    version: String,
    segments: Vec<u64>,
    next_segment_id: u64,
    /// Last logged mutation contained in `segments`.
    #[serde(default)]
    last_seq: SeqNumber,
}

/// Writer settings.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Number of segments tolerated before adjacent ones are merged.
    pub max_segments: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig { max_segments: 8 }
    }
}

#[derive(Debug, Clone)]
struct SegmentEntry {
    id: u64,
    segment: Arc<Segment>,
    live: Arc<BitVec>,
    persisted: bool,
    live_dirty: bool,
}

impl SegmentEntry {
    fn live_count(&self) -> usize {
        self.live.iter().filter(|b| *b).count()
    }
}

#[derive(Debug)]
struct WriterState {
    segments: Vec<SegmentEntry>,
    pending: Segment,
    pending_live: BitVec,
    taxonomy: Arc<Taxonomy>,
    taxonomy_dirty: bool,
    next_segment_id: u64,
    /// Last logged mutation applied to this state.
    applied_seq: SeqNumber,
}

/// Writer of one index area.
///
/// All mutations and commits serialize on one lock; snapshots are shared
/// and only rebuilt after a change.
#[derive(Debug)]
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    taxonomy_storage: Arc<dyn Storage>,
    analyzer: Arc<dyn Analyzer>,
    facets: Arc<FacetsConfig>,
    config: WriterConfig,
    wal: WalManager,
    state: Mutex<WriterState>,
    generation: AtomicU64,
    current: RwLock<Arc<IndexSnapshot>>,
}

impl IndexWriter {
    /// Open the index in `storage`, replaying any logged mutations that were
    /// not committed.
    pub fn open(
        storage: Arc<dyn Storage>,
        taxonomy_storage: Arc<dyn Storage>,
        analyzer: Arc<dyn Analyzer>,
        facets: Arc<FacetsConfig>,
        config: WriterConfig,
    ) -> Result<Self> {
        let manifest: Manifest = read_json(storage.as_ref(), MANIFEST_FILE)?.unwrap_or_default();
        let mut segments = Vec::with_capacity(manifest.segments.len());
        for &id in &manifest.segments {
            let mut segment: Segment = read_blob(storage.as_ref(), &segment_file(id))?;
            segment.seal();
            let live = if storage.file_exists(&deletions_file(id)) {
                read_blob::<BitVec>(storage.as_ref(), &deletions_file(id))?
            } else {
                BitVec::from_elem(segment.len(), true)
            };
            if live.len() != segment.len() {
                return Err(TaxisError::index(format!(
                    "segment {id}: {} documents but {} deletion bits",
                    segment.len(),
                    live.len()
                )));
            }
            segments.push(SegmentEntry {
                id,
                segment: Arc::new(segment),
                live: Arc::new(live),
                persisted: true,
                live_dirty: false,
            });
        }
        let taxonomy = Taxonomy::load(taxonomy_storage.as_ref())?;

        let wal = WalManager::new(storage.clone(), WAL_FILE);
        wal.advance_past(manifest.last_seq);
        let writer = IndexWriter {
            storage,
            taxonomy_storage,
            analyzer,
            facets,
            config,
            wal,
            state: Mutex::new(WriterState {
                segments,
                pending: Segment::new(),
                pending_live: BitVec::new(),
                taxonomy: Arc::new(taxonomy),
                taxonomy_dirty: false,
                next_segment_id: manifest.next_segment_id,
                applied_seq: manifest.last_seq,
            }),
            generation: AtomicU64::new(1),
            current: RwLock::new(Arc::new(IndexSnapshot::empty())),
        };

        writer.replay(manifest.last_seq)?;
        Ok(writer)
    }

    /// Apply the logged mutations newer than `committed`.
    fn replay(&self, committed: SeqNumber) -> Result<()> {
        let records = self.wal.read_all()?;
        let (done, pending): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| r.seq <= committed);
        if !done.is_empty() {
            info!("skipping {} logged mutations already committed", done.len());
        }
        if !pending.is_empty() {
            info!("replaying {} logged index mutations", pending.len());
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for record in pending {
            if let Err(e) = self.apply(state, &record.entry) {
                warn!("cannot replay logged mutation {}: {e}", record.seq);
            }
            state.applied_seq = record.seq;
        }
        Ok(())
    }

    pub fn facets(&self) -> &Arc<FacetsConfig> {
        &self.facets
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    /// Add a document.
    pub fn add(&self, document: IndexDocument) -> Result<()> {
        self.log_and_apply(WalEntry::Add { document }).map(|_| ())
    }

    /// Delete every document containing the exact term. Returns the number
    /// of documents deleted.
    pub fn delete_term(&self, field: &str, term: &str) -> Result<usize> {
        self.log_and_apply(WalEntry::DeleteTerm {
            field: field.to_string(),
            term: term.to_string(),
        })
    }

    /// Delete every document matching `query`. Returns the number of
    /// documents deleted.
    pub fn delete_query(&self, query: &Query) -> Result<usize> {
        self.log_and_apply(WalEntry::DeleteQuery {
            query: query.clone(),
        })
    }

    /// Delete the documents containing the exact term and add `document`,
    /// with no other mutation in between. Returns the number of documents
    /// deleted.
    pub fn replace(&self, field: &str, term: &str, document: IndexDocument) -> Result<usize> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let deleted = self.log_and_apply_locked(
            state,
            WalEntry::DeleteTerm {
                field: field.to_string(),
                term: term.to_string(),
            },
        )?;
        self.log_and_apply_locked(state, WalEntry::Add { document })?;
        Ok(deleted)
    }

    fn log_and_apply(&self, entry: WalEntry) -> Result<usize> {
        let mut guard = self.state.lock();
        self.log_and_apply_locked(&mut guard, entry)
    }

    fn log_and_apply_locked(&self, state: &mut WriterState, entry: WalEntry) -> Result<usize> {
        let seq = self.wal.append(&entry)?;
        let changed = self.apply(state, &entry)?;
        state.applied_seq = seq;
        Ok(changed)
    }

    /// Apply one mutation. Returns the number of documents added or
    /// deleted.
    fn apply(&self, state: &mut WriterState, entry: &WalEntry) -> Result<usize> {
        match entry {
            WalEntry::Add { document } => {
                self.apply_add(state, document)?;
                Ok(1)
            }
            WalEntry::DeleteTerm { field, term } => Ok(self.apply_delete_term(state, field, term)),
            WalEntry::DeleteQuery { query } => self.apply_delete_query(state, query),
        }
    }

    fn apply_add(&self, state: &mut WriterState, document: &IndexDocument) -> Result<()> {
        let before = state.taxonomy.len();
        state.pending.add_document(
            document,
            self.analyzer.as_ref(),
            Arc::make_mut(&mut state.taxonomy),
            &self.facets,
        )?;
        state.pending_live.push(true);
        if state.taxonomy.len() != before {
            state.taxonomy_dirty = true;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn apply_delete_term(&self, state: &mut WriterState, field: &str, term: &str) -> usize {
        let mut deleted = 0;
        for entry in state.segments.iter_mut() {
            let docs: Vec<LocalDocId> = entry
                .segment
                .postings(field, term)
                .iter()
                .map(|p| p.doc)
                .filter(|&d| entry.live.get(d as usize).unwrap_or(false))
                .collect();
            if docs.is_empty() {
                continue;
            }
            let live = Arc::make_mut(&mut entry.live);
            for doc in docs {
                live.set(doc as usize, false);
                deleted += 1;
            }
            entry.live_dirty = true;
        }
        for posting in state.pending.postings(field, term) {
            let doc = posting.doc as usize;
            if state.pending_live.get(doc).unwrap_or(false) {
                state.pending_live.set(doc, false);
                deleted += 1;
            }
        }
        if deleted > 0 {
            debug!("deleted {deleted} documents with {field}:{term}");
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        deleted
    }

    fn apply_delete_query(&self, state: &mut WriterState, query: &Query) -> Result<usize> {
        self.flush_pending(state);
        let snapshot = self.build_snapshot(state);
        let docs = Matcher::new(&snapshot, self.analyzer.as_ref()).matching_docs(query)?;
        let deleted = Self::clear_docs(&mut state.segments, &docs);
        if deleted > 0 {
            debug!("deleted {deleted} documents matching {query}");
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        Ok(deleted)
    }

    /// Clear the live bits of snapshot-wide document ids.
    fn clear_docs(segments: &mut [SegmentEntry], docs: &BTreeSet<DocId>) -> usize {
        let mut deleted = 0;
        let mut base: DocId = 0;
        for entry in segments.iter_mut() {
            let end = base + entry.segment.len() as DocId;
            let local: Vec<usize> = docs
                .range(base..end)
                .map(|d| (d - base) as usize)
                .collect();
            if !local.is_empty() {
                let live = Arc::make_mut(&mut entry.live);
                for doc in local {
                    if live.get(doc).unwrap_or(false) {
                        live.set(doc, false);
                        deleted += 1;
                    }
                }
                entry.live_dirty = true;
            }
            base = end;
        }
        deleted
    }

    /// Seal the pending documents into a new segment.
    fn flush_pending(&self, state: &mut WriterState) {
        if state.pending.is_empty() {
            return;
        }
        let mut segment = std::mem::take(&mut state.pending);
        segment.seal();
        let live = std::mem::take(&mut state.pending_live);
        let id = state.next_segment_id;
        state.next_segment_id += 1;
        debug!("flushed segment {id} with {} documents", segment.len());
        state.segments.push(SegmentEntry {
            id,
            segment: Arc::new(segment),
            live: Arc::new(live),
            persisted: false,
            live_dirty: true,
        });
        self.maybe_merge(state);
    }

    /// Merge the adjacent pair with the fewest live documents until the
    /// segment count is within bounds.
    fn maybe_merge(&self, state: &mut WriterState) {
        let max_segments = self.config.max_segments.max(1);
        while state.segments.len() > max_segments {
            let Some(i) = (0..state.segments.len() - 1).min_by_key(|&i| {
                state.segments[i].live_count() + state.segments[i + 1].live_count()
            }) else {
                break;
            };
            let left = state.segments[i].clone();
            let right = state.segments[i + 1].clone();
            let merged = Segment::merge(&[&left.segment, &right.segment], |part, doc| {
                let live = if part == 0 { &left.live } else { &right.live };
                live.get(doc as usize).unwrap_or(false)
            });
            let id = state.next_segment_id;
            state.next_segment_id += 1;
            debug!(
                "merged segments {} and {} into {id} ({} documents)",
                left.id,
                right.id,
                merged.len()
            );
            let live = BitVec::from_elem(merged.len(), true);
            state.segments.remove(i + 1);
            state.segments[i] = SegmentEntry {
                id,
                segment: Arc::new(merged),
                live: Arc::new(live),
                persisted: false,
                live_dirty: true,
            };
        }
    }

    fn build_snapshot(&self, state: &WriterState) -> IndexSnapshot {
        IndexSnapshot::new(
            state
                .segments
                .iter()
                .map(|e| (e.segment.clone(), e.live.clone()))
                .collect(),
            state.taxonomy.clone(),
            self.generation.load(Ordering::SeqCst),
        )
    }

    /// A consistent view of every document added so far. The view is only
    /// rebuilt when the index changed since the previous call.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        let generation = self.generation.load(Ordering::SeqCst);
        {
            let current = self.current.read();
            if current.generation() == generation {
                return current.clone();
            }
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.flush_pending(state);
        let snapshot = Arc::new(self.build_snapshot(state));
        *self.current.write() = snapshot.clone();
        snapshot
    }

    /// Persist every segment, deletion set and the taxonomy, publish them in
    /// the manifest, then clear the log.
    pub fn commit(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.flush_pending(state);

        for entry in state.segments.iter_mut() {
            if !entry.persisted {
                write_blob(self.storage.as_ref(), &segment_file(entry.id), entry.segment.as_ref())?;
                entry.persisted = true;
            }
            if entry.live_dirty {
                write_blob(self.storage.as_ref(), &deletions_file(entry.id), entry.live.as_ref())?;
                entry.live_dirty = false;
            }
        }
        if state.taxonomy_dirty {
            state.taxonomy.save(self.taxonomy_storage.as_ref())?;
            state.taxonomy_dirty = false;
        }
        self.taxonomy_storage.sync()?;

        let manifest = Manifest {
            version: crate::VERSION.to_string(),
            segments: state.segments.iter().map(|e| e.id).collect(),
            next_segment_id: state.next_segment_id,
            last_seq: state.applied_seq,
        };
        write_json(self.storage.as_ref(), MANIFEST_FILE, &manifest)?;

        let keep: BTreeSet<String> = state
            .segments
            .iter()
            .flat_map(|e| [segment_file(e.id), deletions_file(e.id)])
            .collect();
        for name in self.storage.list_files()? {
            if name.starts_with(SEGMENT_PREFIX) && !keep.contains(&name) {
                if let Err(e) = self.storage.delete_file(&name) {
                    warn!("cannot remove stale segment file {name}: {e}");
                }
            }
        }

        self.wal.truncate()?;
        self.storage.sync()?;
        info!(
            "committed {} segments up to mutation {} (next segment {})",
            state.segments.len(),
            manifest.last_seq,
            state.next_segment_id
        );
        Ok(())
    }

    /// Number of segments, counting pending documents as one.
    pub fn segment_count(&self) -> usize {
        let state = self.state.lock();
        state.segments.len() + usize::from(!state.pending.is_empty())
    }
}
