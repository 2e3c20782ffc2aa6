//! Chunk format and codec.
//!
//! A chunk is the unit of storage and retrieval: up to `chunk_size` ticks of
//! one symbol, sorted by time and packed column by column.

mod bitmask;
mod codec;
mod document;

pub use codec::{ChunkCodec, DecodedChunk};
pub use document::{ChunkDocument, ChunkImage, ColumnKind, PackedColumn, CHUNK_VERSION};
