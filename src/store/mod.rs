//! Document storage underneath the tick store.
//!
//! The engine only needs a handful of operations from its backing store:
//! insert a chunk, find chunks by symbol and time overlap, set or clear a
//! chunk's image, and delete. [`DocumentStore`] captures that contract;
//! [`MemoryStore`] and [`DirStore`] implement it.

mod dir;
mod memory;

use std::fmt;

use crate::chunk::{ChunkDocument, ChunkImage};
use crate::error::Result;
use crate::interval::ResolvedRange;

pub use dir::DirStore;
pub use memory::{MemoryStore, StoreStats};

/// Store-assigned chunk identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chunk index entry: everything about a chunk except its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMeta {
    pub id: ChunkId,
    pub symbol: String,
    pub start: i64,
    pub end: i64,
    pub count: u32,
    pub has_image: bool,
}

/// Chunk index predicate.
///
/// `symbol == symbol AND start <= start_lte AND end >= end_gte`, with every
/// absent clause omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkQuery {
    pub symbol: Option<String>,
    pub start_lte: Option<i64>,
    pub end_gte: Option<i64>,
}

impl ChunkQuery {
    /// All chunks of every symbol.
    pub fn all() -> Self {
        Self::default()
    }

    /// All chunks of one symbol.
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Self::default()
        }
    }

    /// Restrict to chunks whose `[start, end]` can hold a member of `range`.
    ///
    /// Boundary kinds are ignored here; exact trimming happens after decode.
    pub fn overlapping(mut self, range: &ResolvedRange) -> Self {
        self.start_lte = range.end;
        self.end_gte = range.start;
        self
    }

    pub fn matches(&self, meta: &ChunkMeta) -> bool {
        self.symbol.as_deref().map_or(true, |s| s == meta.symbol)
            && self.start_lte.map_or(true, |e| meta.start <= e)
            && self.end_gte.map_or(true, |s| meta.end >= s)
    }
}

/// Backing store for chunk documents.
///
/// Results of `find` and `find_meta` are ordered by `(start, id)`.
pub trait DocumentStore {
    /// Insert a new chunk and return its id. Any `id` on `doc` is ignored.
    fn insert(&mut self, doc: ChunkDocument) -> Result<ChunkId>;

    /// Chunks matching `query`, payload included.
    fn find(&self, query: &ChunkQuery) -> Result<Vec<ChunkDocument>>;

    /// Index entries of chunks matching `query`, without payload.
    fn find_meta(&self, query: &ChunkQuery) -> Result<Vec<ChunkMeta>>;

    /// Replace or clear the image of one chunk.
    ///
    /// # Errors
    ///
    /// - `Error::ChunkNotFound`: no chunk has this id
    fn set_image(&mut self, id: ChunkId, image: Option<ChunkImage>) -> Result<()>;

    /// Delete matching chunks, returning how many were removed.
    fn delete(&mut self, query: &ChunkQuery) -> Result<usize>;

    /// Distinct symbols with at least one chunk, sorted.
    fn symbols(&self) -> Result<Vec<String>>;
}
