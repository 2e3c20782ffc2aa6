//! Batch writer.

use chrono::Utc;

use crate::error::{Error, Result};
use crate::store::{ChunkId, DocumentStore};
use crate::tick::{millis_to_datetime, Tick, INDEX_FIELD, SYMBOL_FIELD};
use crate::tick_store::TickStore;

impl<S: DocumentStore> TickStore<S> {
    /// Write a batch of ticks for `symbol` using the configured chunk size.
    ///
    /// Returns the ids of the inserted chunks in insertion order.
    ///
    /// # Errors
    ///
    /// - `Error::Validation`: a naive or out-of-range timestamp, a reserved
    ///   field name or a column mixing text and numbers. Nothing is inserted.
    pub fn write(&mut self, symbol: &str, ticks: &[Tick]) -> Result<Vec<ChunkId>> {
        self.write_with_chunk_size(symbol, ticks, self.config.chunk_size)
    }

    /// Write with an explicit chunk size for this call.
    pub fn write_with_chunk_size(
        &mut self,
        symbol: &str,
        ticks: &[Tick],
        chunk_size: usize,
    ) -> Result<Vec<ChunkId>> {
        if chunk_size == 0 {
            return Err(Error::Validation("chunk_size must be > 0".to_string()));
        }
        if ticks.is_empty() {
            log::debug!("empty batch for {}, nothing written", symbol);
            return Ok(Vec::new());
        }
        validate_batch(ticks)?;

        // Encode every group before inserting any, so a bad group leaves
        // the store untouched.
        let docs = ticks
            .chunks(chunk_size)
            .map(|group| self.codec.encode(symbol, group))
            .collect::<Result<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.store.insert(doc)?);
        }
        log::info!(
            "wrote {} ticks for {} in {} chunks",
            ticks.len(),
            symbol,
            ids.len()
        );
        Ok(ids)
    }
}

fn validate_batch(ticks: &[Tick]) -> Result<()> {
    for (row, tick) in ticks.iter().enumerate() {
        if tick.timestamp.is_naive() {
            return Err(Error::Validation(format!(
                "row {row}: timestamp has no timezone"
            )));
        }
        let ms = tick.timestamp.to_millis()?;
        if millis_to_datetime(ms, &Utc).is_none() {
            return Err(Error::Validation(format!(
                "row {row}: timestamp {ms} is out of range"
            )));
        }
        if let Some(name) = tick
            .fields
            .keys()
            .find(|name| *name == INDEX_FIELD || *name == SYMBOL_FIELD)
        {
            return Err(Error::Validation(format!(
                "row {row}: field name {name} is reserved"
            )));
        }
    }
    Ok(())
}
