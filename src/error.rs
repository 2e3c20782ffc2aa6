use thiserror::Error;

use crate::store::ChunkId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),
    #[error("invalid tick batch: {0}")]
    Validation(String),
    #[error("no data found for {0}")]
    NoData(String),
    #[error("invalid date range: {0}")]
    InvalidRange(String),
    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkId),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "arrow")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl Error {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Error::NoData(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
