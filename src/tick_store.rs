//! Tick store handle.
//!
//! Ties a [`DocumentStore`] to a configuration and a chunk codec. Writing
//! lives in `writer.rs`, reading in `reader.rs`; this file holds the handle
//! itself and the administrative operations.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::chunk::{ChunkCodec, ChunkImage};
use crate::config::TickStoreConfig;
use crate::error::{Error, Result};
use crate::store::{ChunkId, ChunkMeta, ChunkQuery, DocumentStore};
use crate::tick::millis_to_datetime;

/// Tick-level time-series store.
///
/// # Example
///
/// ```no_run
/// use tickstore::{DateRange, MemoryStore, ReadRequest, Tick, TickStore};
///
/// let mut store = TickStore::new(MemoryStore::new());
/// store.write("FEED::SYMBOL", &[Tick::new(1_357_300_800_000i64).with("BID", 1.5)])?;
///
/// let request = ReadRequest::new().date_range(DateRange::ymd(20130104, 20130105)?);
/// let frame = store.read("FEED::SYMBOL", &request)?;
/// assert_eq!(frame.len(), 1);
/// # Ok::<(), tickstore::Error>(())
/// ```
pub struct TickStore<S> {
    pub(crate) store: S,
    pub(crate) config: TickStoreConfig,
    pub(crate) codec: ChunkCodec,
}

impl<S: DocumentStore> TickStore<S> {
    /// Create a store with the default configuration.
    pub fn new(store: S) -> Self {
        let config = TickStoreConfig::default();
        let codec = ChunkCodec::new(config.compression_level);
        Self {
            store,
            config,
            codec,
        }
    }

    /// Create a store with an explicit configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Validation`: zero chunk size or compression level out of range
    pub fn with_config(store: S, config: TickStoreConfig) -> Result<Self> {
        config.validate()?;
        let codec = ChunkCodec::new(config.compression_level);
        Ok(Self {
            store,
            config,
            codec,
        })
    }

    pub fn config(&self) -> &TickStoreConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Remove every chunk of `symbol`. Returns the number of chunks removed.
    pub fn delete(&mut self, symbol: &str) -> Result<usize> {
        let removed = self.store.delete(&ChunkQuery::symbol(symbol))?;
        log::info!("deleted {} chunks for {}", removed, symbol);
        Ok(removed)
    }

    /// Attach a snapshot image to an existing chunk, replacing any previous one.
    ///
    /// # Errors
    ///
    /// - `Error::ChunkNotFound`: no chunk has this id
    /// - `Error::Validation`: an image value is infinite
    pub fn attach_image(&mut self, id: ChunkId, image: ChunkImage) -> Result<()> {
        let image = image.normalized()?;
        log::debug!("attaching image at {} to chunk {}", image.timestamp, id);
        self.store.set_image(id, Some(image))
    }

    pub fn clear_image(&mut self, id: ChunkId) -> Result<()> {
        self.store.set_image(id, None)
    }

    /// Chunk index entries for `symbol`, ordered by start.
    pub fn chunks(&self, symbol: &str) -> Result<Vec<ChunkMeta>> {
        self.store.find_meta(&ChunkQuery::symbol(symbol))
    }

    pub fn list_symbols(&self) -> Result<Vec<String>> {
        self.store.symbols()
    }

    /// Earliest stored timestamp of `symbol`.
    pub fn min_date(&self, symbol: &str) -> Result<DateTime<Tz>> {
        let start = self
            .chunks(symbol)?
            .iter()
            .map(|meta| meta.start)
            .min()
            .ok_or_else(|| Error::NoData(symbol.to_string()))?;
        self.render(start)
    }

    /// Latest stored timestamp of `symbol`.
    pub fn max_date(&self, symbol: &str) -> Result<DateTime<Tz>> {
        let end = self
            .chunks(symbol)?
            .iter()
            .map(|meta| meta.end)
            .max()
            .ok_or_else(|| Error::NoData(symbol.to_string()))?;
        self.render(end)
    }

    fn render(&self, millis: i64) -> Result<DateTime<Tz>> {
        millis_to_datetime(millis, &self.config.timezone)
            .ok_or(Error::Corrupt("stored timestamp out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tick::Tick;

    #[test]
    fn test_with_config_validates() {
        let config = TickStoreConfig::default().with_chunk_size(0);
        assert!(matches!(
            TickStore::with_config(MemoryStore::new(), config),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_min_max_date() {
        let mut store = TickStore::new(MemoryStore::new());
        let ticks: Vec<Tick> = [5_000i64, 1_000, 9_000, 3_000]
            .iter()
            .map(|&ts| Tick::new(ts).with("x", 1))
            .collect();
        store.write_with_chunk_size("A", &ticks, 2).unwrap();

        assert_eq!(store.min_date("A").unwrap().timestamp_millis(), 1_000);
        assert_eq!(store.max_date("A").unwrap().timestamp_millis(), 9_000);
        assert!(store.min_date("B").unwrap_err().is_no_data());
        assert_eq!(store.chunks("A").unwrap().len(), 2);
    }

    #[test]
    fn test_delete_symbol() {
        let mut store = TickStore::new(MemoryStore::new());
        store.write("A", &[Tick::new(1i64).with("x", 1)]).unwrap();
        store.write("B", &[Tick::new(1i64).with("x", 1)]).unwrap();
        assert_eq!(store.list_symbols().unwrap(), vec!["A", "B"]);
        assert_eq!(store.delete("A").unwrap(), 1);
        assert_eq!(store.list_symbols().unwrap(), vec!["B"]);
    }

    #[test]
    fn test_attach_unknown_chunk() {
        let mut store = TickStore::new(MemoryStore::new());
        let err = store
            .attach_image(ChunkId(3), ChunkImage::new(0))
            .unwrap_err();
        assert!(matches!(err, Error::ChunkNotFound(_)));
    }
}
