//! Persisted chunk layout.
//!
//! A [`ChunkDocument`] is what the writer inserts and what the store hands
//! back. Its `symbol`/`start`/`end` fields are the chunk index; `index` and
//! `columns` hold the packed rows; `image` is the optional snapshot row that
//! can be set after the chunk was written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{ChunkId, ChunkMeta};
use crate::tick::Scalar;

/// Current chunk format version.
pub const CHUNK_VERSION: u32 = 1;

/// Storage kind of a packed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Int64,
    Float64,
    Text,
}

impl ColumnKind {
    pub fn code(self) -> u8 {
        match self {
            ColumnKind::Int64 => 1,
            ColumnKind::Float64 => 2,
            ColumnKind::Text => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(ColumnKind::Int64),
            2 => Ok(ColumnKind::Float64),
            3 => Ok(ColumnKind::Text),
            _ => Err(Error::Corrupt("unknown column kind")),
        }
    }

    /// Common kind for two column fragments.
    ///
    /// Integers widen to floats; anything meeting text becomes text.
    pub fn promote(self, other: ColumnKind) -> ColumnKind {
        match (self, other) {
            (a, b) if a == b => a,
            (ColumnKind::Text, _) | (_, ColumnKind::Text) => ColumnKind::Text,
            _ => ColumnKind::Float64,
        }
    }

    /// Kind used for a column some rows do not supply.
    pub fn with_missing(self) -> ColumnKind {
        match self {
            ColumnKind::Int64 => ColumnKind::Float64,
            other => other,
        }
    }
}

/// One packed column: `count` dense cells plus a presence mask.
///
/// `data` is zstd-compressed. Float and integer cells are 8-byte little
/// endian; text cells are a u32 length followed by UTF-8 bytes, with missing
/// cells stored as empty strings. `mask` is the uncompressed bitset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedColumn {
    pub kind: ColumnKind,
    pub data: Vec<u8>,
    pub mask: Vec<u8>,
}

/// Snapshot row attached out-of-band to a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkImage {
    /// UTC epoch milliseconds.
    pub timestamp: i64,
    pub values: BTreeMap<String, Scalar>,
}

impl ChunkImage {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Drop NaN values, which read back as missing anyway.
    ///
    /// # Errors
    ///
    /// - `Error::Validation`: an infinite value
    pub fn normalized(mut self) -> Result<Self> {
        if let Some((name, _)) = self
            .values
            .iter()
            .find(|(_, v)| matches!(v, Scalar::Float(f) if f.is_infinite()))
        {
            return Err(Error::Validation(format!("image value {name} is infinite")));
        }
        self.values
            .retain(|_, v| !matches!(v, Scalar::Float(f) if f.is_nan()));
        Ok(self)
    }
}

/// A stored chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDocument {
    /// Assigned by the store on insert.
    pub id: Option<ChunkId>,
    pub version: u32,
    pub symbol: String,
    /// Smallest timestamp in `index`, UTC epoch milliseconds.
    pub start: i64,
    /// Largest timestamp in `index`, UTC epoch milliseconds.
    pub end: i64,
    pub count: u32,
    /// zstd-compressed delta-encoded little-endian i64 timestamps.
    pub index: Vec<u8>,
    pub columns: BTreeMap<String, PackedColumn>,
    pub image: Option<ChunkImage>,
}

impl ChunkDocument {
    pub fn meta(&self) -> ChunkMeta {
        ChunkMeta {
            id: self.id.unwrap_or_default(),
            symbol: self.symbol.clone(),
            start: self.start,
            end: self.end,
            count: self.count,
            has_image: self.image.is_some(),
        }
    }

    /// Serialize everything except `id` and `symbol` (which the store keeps
    /// in its own header).
    pub fn encode_body(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(64 + self.index.len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.start.to_le_bytes());
        out.extend_from_slice(&self.end.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        put_bytes(&mut out, &self.index);
        out.extend_from_slice(&(self.columns.len() as u32).to_le_bytes());
        for (name, column) in &self.columns {
            put_bytes(&mut out, name.as_bytes());
            out.push(column.kind.code());
            put_bytes(&mut out, &column.data);
            put_bytes(&mut out, &column.mask);
        }
        match &self.image {
            None => out.push(0),
            Some(image) => {
                out.push(1);
                put_bytes(&mut out, &serde_json::to_vec(image)?);
            }
        }
        Ok(out)
    }

    pub fn decode_body(id: ChunkId, symbol: String, body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { buf: body, pos: 0 };
        let version = cursor.u32()?;
        if version != CHUNK_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let start = cursor.i64()?;
        let end = cursor.i64()?;
        let count = cursor.u32()?;
        let index = cursor.bytes()?.to_vec();

        let column_count = cursor.u32()? as usize;
        let mut columns = BTreeMap::new();
        for _ in 0..column_count {
            let name = std::str::from_utf8(cursor.bytes()?)
                .map_err(|_| Error::Corrupt("column name is not utf-8"))?
                .to_string();
            let kind = ColumnKind::from_code(cursor.u8()?)?;
            let data = cursor.bytes()?.to_vec();
            let mask = cursor.bytes()?.to_vec();
            columns.insert(name, PackedColumn { kind, data, mask });
        }

        let image = match cursor.u8()? {
            0 => None,
            1 => Some(serde_json::from_slice(cursor.bytes()?)?),
            _ => return Err(Error::Corrupt("bad image flag")),
        };
        if cursor.pos != body.len() {
            return Err(Error::Corrupt("trailing bytes after chunk body"));
        }

        Ok(Self {
            id: Some(id),
            version,
            symbol,
            start,
            end,
            count,
            index,
            columns,
            image,
        })
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(Error::Corrupt("chunk body truncated"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("slice length")))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("slice length")))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().expect("slice length")))
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = usize::try_from(self.u64()?).map_err(|_| Error::Corrupt("length overflow"))?;
        self.take(len)
    }
}
