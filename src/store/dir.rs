//! Directory-backed document store.
//!
//! One file per chunk, named `chunk-{id:016x}.tck`:
//!
//! ```text
//! 0..4    magic
//! 4..8    file version
//! 8..16   chunk id
//! 16..24  start (ms)
//! 24..32  end (ms)
//! 32..36  row count
//! 36..40  flags (bit 0: has image)
//! 40..44  symbol length
//! 44..52  body length
//! 52..56  crc32 of symbol + body
//! 56..64  reserved
//! ```
//!
//! The symbol bytes and the encoded chunk body follow the header. Index
//! queries read only the header and symbol.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::chunk::{ChunkDocument, ChunkImage};
use crate::error::{Error, Result};
use crate::store::{ChunkId, ChunkMeta, ChunkQuery, DocumentStore};

pub const CHUNK_FILE_MAGIC: u32 = 0x4B43_5454; // "TTCK"
pub const CHUNK_FILE_VERSION: u32 = 1;
pub const CHUNK_HEADER_SIZE: usize = 64;

const FLAG_HAS_IMAGE: u32 = 1;
const CHUNK_EXT: &str = "tck";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkFileHeader {
    id: ChunkId,
    start: i64,
    end: i64,
    count: u32,
    flags: u32,
    symbol_len: u32,
    body_len: u64,
    crc: u32,
}

impl ChunkFileHeader {
    fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&CHUNK_FILE_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&CHUNK_FILE_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.id.0.to_le_bytes());
        buf[16..24].copy_from_slice(&self.start.to_le_bytes());
        buf[24..32].copy_from_slice(&self.end.to_le_bytes());
        buf[32..36].copy_from_slice(&self.count.to_le_bytes());
        buf[36..40].copy_from_slice(&self.flags.to_le_bytes());
        buf[40..44].copy_from_slice(&self.symbol_len.to_le_bytes());
        buf[44..52].copy_from_slice(&self.body_len.to_le_bytes());
        buf[52..56].copy_from_slice(&self.crc.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8; CHUNK_HEADER_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes(bytes[0..4].try_into().expect("slice length"));
        if magic != CHUNK_FILE_MAGIC {
            return Err(Error::Corrupt("chunk file magic mismatch"));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().expect("slice length"));
        if version != CHUNK_FILE_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok(Self {
            id: ChunkId(u64::from_le_bytes(bytes[8..16].try_into().expect("slice length"))),
            start: i64::from_le_bytes(bytes[16..24].try_into().expect("slice length")),
            end: i64::from_le_bytes(bytes[24..32].try_into().expect("slice length")),
            count: u32::from_le_bytes(bytes[32..36].try_into().expect("slice length")),
            flags: u32::from_le_bytes(bytes[36..40].try_into().expect("slice length")),
            symbol_len: u32::from_le_bytes(bytes[40..44].try_into().expect("slice length")),
            body_len: u64::from_le_bytes(bytes[44..52].try_into().expect("slice length")),
            crc: u32::from_le_bytes(bytes[52..56].try_into().expect("slice length")),
        })
    }
}

/// Document store keeping each chunk in its own file under `root`.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    next_id: u64,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let mut store = Self { root, next_id: 0 };
        let max_id = store
            .chunk_paths()?
            .iter()
            .map(|path| store.read_header(path).map(|(header, _)| header.id.0))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .max()
            .unwrap_or(0);
        store.next_id = max_id;
        log::debug!("opened chunk store at {} (last id {})", store.root.display(), max_id);
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunk_path(&self, id: ChunkId) -> PathBuf {
        self.root.join(format!("chunk-{:016x}.{CHUNK_EXT}", id.0))
    }

    fn chunk_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(CHUNK_EXT) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn read_header(&self, path: &Path) -> Result<(ChunkFileHeader, String)> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        file.read_exact(&mut buf)?;
        let header = ChunkFileHeader::from_bytes(&buf)?;
        let mut symbol = vec![0u8; header.symbol_len as usize];
        file.read_exact(&mut symbol)?;
        let symbol =
            String::from_utf8(symbol).map_err(|_| Error::Corrupt("symbol is not utf-8"))?;
        Ok((header, symbol))
    }

    fn read_document(&self, path: &Path) -> Result<ChunkDocument> {
        let data = fs::read(path)?;
        if data.len() < CHUNK_HEADER_SIZE {
            return Err(Error::Corrupt("chunk file shorter than header"));
        }
        let header_bytes: &[u8; CHUNK_HEADER_SIZE] =
            data[..CHUNK_HEADER_SIZE].try_into().expect("slice length");
        let header = ChunkFileHeader::from_bytes(header_bytes)?;
        let payload = &data[CHUNK_HEADER_SIZE..];
        let symbol_len = header.symbol_len as usize;
        let expected_len = usize::try_from(header.body_len)
            .ok()
            .and_then(|body| body.checked_add(symbol_len))
            .ok_or(Error::Corrupt("chunk length overflow"))?;
        if payload.len() != expected_len {
            return Err(Error::Corrupt("chunk file length mismatch"));
        }
        if crc32fast::hash(payload) != header.crc {
            return Err(Error::Corrupt("chunk checksum mismatch"));
        }
        let symbol = std::str::from_utf8(&payload[..symbol_len])
            .map_err(|_| Error::Corrupt("symbol is not utf-8"))?
            .to_string();
        let doc = ChunkDocument::decode_body(header.id, symbol, &payload[symbol_len..])?;
        if doc.start != header.start || doc.end != header.end || doc.count != header.count {
            return Err(Error::Corrupt("chunk header disagrees with body"));
        }
        Ok(doc)
    }

    fn write_document(&self, id: ChunkId, doc: &ChunkDocument) -> Result<()> {
        let body = doc.encode_body()?;
        let symbol = doc.symbol.as_bytes();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(symbol);
        hasher.update(&body);
        let header = ChunkFileHeader {
            id,
            start: doc.start,
            end: doc.end,
            count: doc.count,
            flags: if doc.image.is_some() { FLAG_HAS_IMAGE } else { 0 },
            symbol_len: u32::try_from(symbol.len())
                .map_err(|_| Error::Validation("symbol too long".to_string()))?,
            body_len: body.len() as u64,
            crc: hasher.finalize(),
        };

        let path = self.chunk_path(id);
        let tmp = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&header.to_bytes())?;
        file.write_all(symbol)?;
        file.write_all(&body)?;
        file.sync_all()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    /// Paths and index entries of chunks matching `query`, ordered by
    /// `(start, id)`.
    fn scan(&self, query: &ChunkQuery) -> Result<Vec<(PathBuf, ChunkMeta)>> {
        let mut out = Vec::new();
        for path in self.chunk_paths()? {
            let (header, symbol) = self.read_header(&path)?;
            let meta = ChunkMeta {
                id: header.id,
                symbol,
                start: header.start,
                end: header.end,
                count: header.count,
                has_image: header.flags & FLAG_HAS_IMAGE != 0,
            };
            if query.matches(&meta) {
                out.push((path, meta));
            }
        }
        out.sort_by_key(|(_, meta)| (meta.start, meta.id));
        Ok(out)
    }
}

impl DocumentStore for DirStore {
    fn insert(&mut self, doc: ChunkDocument) -> Result<ChunkId> {
        let id = ChunkId(self.next_id + 1);
        self.write_document(id, &doc)?;
        self.next_id = id.0;
        Ok(id)
    }

    fn find(&self, query: &ChunkQuery) -> Result<Vec<ChunkDocument>> {
        self.scan(query)?
            .iter()
            .map(|(path, _)| self.read_document(path))
            .collect()
    }

    fn find_meta(&self, query: &ChunkQuery) -> Result<Vec<ChunkMeta>> {
        Ok(self.scan(query)?.into_iter().map(|(_, meta)| meta).collect())
    }

    fn set_image(&mut self, id: ChunkId, image: Option<ChunkImage>) -> Result<()> {
        let path = self.chunk_path(id);
        if !path.exists() {
            return Err(Error::ChunkNotFound(id));
        }
        let mut doc = self.read_document(&path)?;
        doc.image = image;
        self.write_document(id, &doc)
    }

    fn delete(&mut self, query: &ChunkQuery) -> Result<usize> {
        let matched = self.scan(query)?;
        for (path, _) in &matched {
            fs::remove_file(path)?;
        }
        Ok(matched.len())
    }

    fn symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self
            .scan(&ChunkQuery::all())?
            .into_iter()
            .map(|(_, meta)| meta.symbol)
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}
