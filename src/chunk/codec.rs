//! Chunk encoder/decoder.
//!
//! Encoding stable-sorts a batch by timestamp, takes the union of field
//! names as the column set and packs each column densely with a presence
//! mask. Decoding reverses this, materializing missing cells as NaN (numeric)
//! or `None` (text).

use std::collections::{BTreeMap, BTreeSet};

use crate::chunk::bitmask;
use crate::chunk::document::{
    ChunkDocument, ChunkImage, ColumnKind, PackedColumn, CHUNK_VERSION,
};
use crate::config::DEFAULT_COMPRESSION_LEVEL;
use crate::error::{Error, Result};
use crate::frame::Column;
use crate::tick::{Scalar, Tick, INDEX_FIELD, SYMBOL_FIELD};

/// A chunk unpacked into column arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChunk {
    /// Sorted UTC epoch milliseconds, one per row.
    pub index: Vec<i64>,
    pub columns: BTreeMap<String, Column>,
    /// Requested columns the chunk does not store. Their entries in
    /// `columns` are all-missing placeholders.
    pub absent: BTreeSet<String>,
}

impl DecodedChunk {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Columns the chunk actually stores.
    pub fn stored_columns(&self) -> impl Iterator<Item = (&String, &Column)> {
        self.columns
            .iter()
            .filter(|(name, _)| !self.absent.contains(*name))
    }
}

/// Packs tick batches into chunk documents and back.
#[derive(Debug, Clone, Copy)]
pub struct ChunkCodec {
    compression_level: i32,
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl ChunkCodec {
    pub fn new(compression_level: i32) -> Self {
        Self { compression_level }
    }

    /// Encode one batch of ticks for `symbol`.
    ///
    /// # Errors
    ///
    /// - `Error::Validation`: empty batch, naive timestamp, reserved field
    ///   name, or a column mixing text and numbers
    pub fn encode(&self, symbol: &str, ticks: &[Tick]) -> Result<ChunkDocument> {
        self.encode_with_image(symbol, ticks, None)
    }

    /// Encode with an initial image. The image may not be later than the
    /// first tick.
    pub fn encode_with_image(
        &self,
        symbol: &str,
        ticks: &[Tick],
        image: Option<ChunkImage>,
    ) -> Result<ChunkDocument> {
        if ticks.is_empty() {
            return Err(Error::Validation("cannot encode an empty batch".to_string()));
        }

        let stamps = ticks
            .iter()
            .map(|t| t.timestamp.to_millis())
            .collect::<Result<Vec<_>>>()?;

        // Stable: equal timestamps keep input order.
        let mut order: Vec<usize> = (0..ticks.len()).collect();
        order.sort_by_key(|&i| stamps[i]);

        let count = ticks.len();
        let sorted: Vec<i64> = order.iter().map(|&i| stamps[i]).collect();
        let start = sorted[0];
        let end = sorted[count - 1];

        let image = image.map(ChunkImage::normalized).transpose()?;
        if let Some(image) = &image {
            if image.timestamp > start {
                return Err(Error::Validation(format!(
                    "image at {} is after chunk start {start}",
                    image.timestamp
                )));
            }
        }

        let mut cells: BTreeMap<&str, Vec<Option<&Scalar>>> = BTreeMap::new();
        for (row, &src) in order.iter().enumerate() {
            for (name, value) in &ticks[src].fields {
                if name == INDEX_FIELD || name == SYMBOL_FIELD {
                    return Err(Error::Validation(format!("field name {name} is reserved")));
                }
                cells.entry(name.as_str()).or_insert_with(|| vec![None; count])[row] =
                    Some(value);
            }
        }

        let mut columns = BTreeMap::new();
        for (name, values) in cells {
            let packed = self.pack_column(name, &values)?;
            columns.insert(name.to_string(), packed);
        }

        Ok(ChunkDocument {
            id: None,
            version: CHUNK_VERSION,
            symbol: symbol.to_string(),
            start,
            end,
            count: u32::try_from(count)
                .map_err(|_| Error::Validation(format!("batch of {count} ticks is too large")))?,
            index: self.compress(&encode_index(&sorted))?,
            columns,
            image,
        })
    }

    fn pack_column(&self, name: &str, values: &[Option<&Scalar>]) -> Result<PackedColumn> {
        let kind = column_kind(name, values)?;
        let mut raw = Vec::with_capacity(values.len() * 8);
        match kind {
            ColumnKind::Int64 => {
                for value in values {
                    let v = match value {
                        Some(Scalar::Int(v)) => *v,
                        _ => 0,
                    };
                    raw.extend_from_slice(&v.to_le_bytes());
                }
            }
            ColumnKind::Float64 => {
                for value in values {
                    let v = value.and_then(|s| s.as_f64()).unwrap_or(f64::NAN);
                    raw.extend_from_slice(&v.to_le_bytes());
                }
            }
            ColumnKind::Text => {
                for value in values {
                    let text = match value {
                        Some(Scalar::Text(s)) => s.as_bytes(),
                        _ => "".as_bytes(),
                    };
                    let len = u32::try_from(text.len())
                        .map_err(|_| Error::Validation(format!("value in {name} is too long")))?;
                    raw.extend_from_slice(&len.to_le_bytes());
                    raw.extend_from_slice(text);
                }
            }
        }

        let present: Vec<bool> = values.iter().map(Option::is_some).collect();
        Ok(PackedColumn {
            kind,
            data: self.compress(&raw)?,
            mask: bitmask::pack(&present),
        })
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::stream::encode_all(raw, self.compression_level)?)
    }

    /// Decode a chunk.
    ///
    /// With `columns == None` every stored column is returned. A requested
    /// column the chunk does not store comes back as an all-missing float
    /// column and is listed in [`DecodedChunk::absent`].
    pub fn decode(&self, doc: &ChunkDocument, columns: Option<&[String]>) -> Result<DecodedChunk> {
        if doc.version != CHUNK_VERSION {
            return Err(Error::UnsupportedVersion(doc.version));
        }
        let count = doc.count as usize;
        let index = decode_index(&zstd::stream::decode_all(doc.index.as_slice())?)?;
        if index.len() != count {
            return Err(Error::Corrupt("index length does not match row count"));
        }

        let mut out = BTreeMap::new();
        let mut absent = BTreeSet::new();
        match columns {
            None => {
                for (name, packed) in &doc.columns {
                    out.insert(name.clone(), unpack_column(packed, count)?);
                }
            }
            Some(names) => {
                for name in names {
                    match doc.columns.get(name) {
                        Some(packed) => {
                            out.insert(name.clone(), unpack_column(packed, count)?);
                        }
                        None => {
                            out.insert(name.clone(), Column::missing(ColumnKind::Float64, count));
                            absent.insert(name.clone());
                        }
                    }
                }
            }
        }

        Ok(DecodedChunk {
            index,
            columns: out,
            absent,
        })
    }
}

/// Storage kind from the present values of one column.
fn column_kind(name: &str, values: &[Option<&Scalar>]) -> Result<ColumnKind> {
    let mut text = false;
    let mut float = false;
    let mut int = false;
    let mut missing = false;
    for value in values {
        match value {
            None => missing = true,
            Some(Scalar::Text(_)) => text = true,
            Some(Scalar::Float(_)) => float = true,
            Some(Scalar::Int(_)) => int = true,
        }
    }
    if text && (float || int) {
        return Err(Error::Validation(format!(
            "column {name} mixes text and numeric values"
        )));
    }
    Ok(if text {
        ColumnKind::Text
    } else if float || missing {
        ColumnKind::Float64
    } else {
        ColumnKind::Int64
    })
}

fn unpack_column(packed: &PackedColumn, count: usize) -> Result<Column> {
    let present = bitmask::unpack(&packed.mask, count)?;
    let raw = zstd::stream::decode_all(packed.data.as_slice())?;
    match packed.kind {
        ColumnKind::Int64 => {
            let values = read_words(&raw, count)?;
            Ok(Column::Int64(values.map(i64::from_le_bytes).collect()))
        }
        ColumnKind::Float64 => {
            let values = read_words(&raw, count)?;
            Ok(Column::Float64(
                values
                    .zip(&present)
                    .map(|(w, &set)| if set { f64::from_le_bytes(w) } else { f64::NAN })
                    .collect(),
            ))
        }
        ColumnKind::Text => {
            let mut values = Vec::with_capacity(count);
            let mut pos = 0usize;
            for &set in &present {
                let len_bytes = raw
                    .get(pos..pos + 4)
                    .ok_or(Error::Corrupt("text column truncated"))?;
                let len = u32::from_le_bytes(len_bytes.try_into().expect("slice length")) as usize;
                pos += 4;
                let bytes = raw
                    .get(pos..pos + len)
                    .ok_or(Error::Corrupt("text column truncated"))?;
                pos += len;
                values.push(if set {
                    Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|_| Error::Corrupt("text value is not utf-8"))?,
                    )
                } else {
                    None
                });
            }
            Ok(Column::Text(values))
        }
    }
}

fn read_words(raw: &[u8], count: usize) -> Result<impl Iterator<Item = [u8; 8]> + '_> {
    if raw.len() != count * 8 {
        return Err(Error::Corrupt("numeric column length does not match row count"));
    }
    Ok(raw
        .chunks_exact(8)
        .map(|w| w.try_into().expect("slice length")))
}

/// First timestamp followed by successive differences.
fn encode_index(sorted: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(sorted.len() * 8);
    let mut prev = 0i64;
    for &ts in sorted {
        out.extend_from_slice(&ts.wrapping_sub(prev).to_le_bytes());
        prev = ts;
    }
    out
}

fn decode_index(raw: &[u8]) -> Result<Vec<i64>> {
    if raw.len() % 8 != 0 {
        return Err(Error::Corrupt("index length is not a multiple of 8"));
    }
    let mut acc = 0i64;
    let mut out = Vec::with_capacity(raw.len() / 8);
    for word in raw.chunks_exact(8) {
        let delta = i64::from_le_bytes(word.try_into().expect("slice length"));
        if !out.is_empty() && delta < 0 {
            return Err(Error::Corrupt("index is not sorted"));
        }
        acc = acc.wrapping_add(delta);
        out.push(acc);
    }
    Ok(out)
}
