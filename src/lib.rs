//! Tick-level time-series store over a document store.
//!
//! Batches of sparse, mixed-type ticks are packed per symbol into compact
//! column chunks and read back as time-ordered frames filtered by symbol,
//! column and date range. Only chunks whose `[start, end]` can overlap the
//! requested range are loaded.

pub mod chunk;
pub mod config;
pub mod error;
pub mod frame;
pub mod interval;
pub mod reader;
pub mod store;
pub mod tick;
pub mod tick_store;
pub mod writer;

pub use chunk::{ChunkCodec, ChunkDocument, ChunkImage, ColumnKind, DecodedChunk};
pub use config::TickStoreConfig;
pub use error::{Error, Result};
pub use frame::{Column, TickFrame};
pub use interval::{DateBound, DateRange, IntervalKind, ResolvedRange};
pub use reader::{ReadRequest, Symbols};
pub use store::{ChunkId, ChunkMeta, ChunkQuery, DirStore, DocumentStore, MemoryStore, StoreStats};
pub use tick::{Scalar, Tick, TickTime};
pub use tick_store::TickStore;
