use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::chunk::{ChunkDocument, ChunkImage};
use crate::error::{Error, Result};
use crate::store::{ChunkId, ChunkMeta, ChunkQuery, DocumentStore};

/// Read counters kept by [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of `find` calls.
    pub finds: usize,
    /// Total documents handed out by `find`.
    pub documents_returned: usize,
}

/// In-process document store.
///
/// Counts reads so callers can check how many chunks a query touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: BTreeMap<ChunkId, ChunkDocument>,
    next_id: u64,
    finds: AtomicUsize,
    returned: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            finds: self.finds.load(Ordering::Relaxed),
            documents_returned: self.returned.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.finds.store(0, Ordering::Relaxed);
        self.returned.store(0, Ordering::Relaxed);
    }

    fn matching<'a>(&'a self, query: &'a ChunkQuery) -> impl Iterator<Item = &'a ChunkDocument> {
        self.docs.values().filter(move |doc| query.matches(&doc.meta()))
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&mut self, mut doc: ChunkDocument) -> Result<ChunkId> {
        self.next_id += 1;
        let id = ChunkId(self.next_id);
        doc.id = Some(id);
        self.docs.insert(id, doc);
        Ok(id)
    }

    fn find(&self, query: &ChunkQuery) -> Result<Vec<ChunkDocument>> {
        let mut out: Vec<ChunkDocument> = self.matching(query).cloned().collect();
        out.sort_by_key(|doc| (doc.start, doc.id));
        self.finds.fetch_add(1, Ordering::Relaxed);
        self.returned.fetch_add(out.len(), Ordering::Relaxed);
        Ok(out)
    }

    fn find_meta(&self, query: &ChunkQuery) -> Result<Vec<ChunkMeta>> {
        let mut out: Vec<ChunkMeta> = self.matching(query).map(ChunkDocument::meta).collect();
        out.sort_by_key(|meta| (meta.start, meta.id));
        Ok(out)
    }

    fn set_image(&mut self, id: ChunkId, image: Option<ChunkImage>) -> Result<()> {
        let doc = self.docs.get_mut(&id).ok_or(Error::ChunkNotFound(id))?;
        doc.image = image;
        Ok(())
    }

    fn delete(&mut self, query: &ChunkQuery) -> Result<usize> {
        let before = self.docs.len();
        self.docs.retain(|_, doc| !query.matches(&doc.meta()));
        Ok(before - self.docs.len())
    }

    fn symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self.docs.values().map(|doc| doc.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}
