//! Store configuration.
//!
//! Defines chunk sizing, the default timezone and payload compression.

use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 200;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

const TIMEZONE_ENV: &str = "TICKSTORE_TIMEZONE";
const CHUNK_SIZE_ENV: &str = "TICKSTORE_CHUNK_SIZE";

/// Configuration for a tick store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickStoreConfig {
    /// Maximum number of ticks packed into one chunk.
    /// Default: 200
    pub chunk_size: usize,

    /// Timezone used for naive and date-only range bounds and for the
    /// index of read results.
    /// Default: UTC
    pub timezone: Tz,

    /// Zstd compression level (1-22) for packed index and column payloads.
    /// Default: 3
    pub compression_level: i32,
}

impl Default for TickStoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timezone: Tz::UTC,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl TickStoreConfig {
    /// Defaults overridden by `TICKSTORE_TIMEZONE` (or `TZ`) and
    /// `TICKSTORE_CHUNK_SIZE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        let tz_name = std::env::var(TIMEZONE_ENV)
            .or_else(|_| std::env::var("TZ"))
            .ok();
        if let Some(name) = tz_name {
            config.timezone = parse_timezone(&name)?;
        }
        if let Ok(raw) = std::env::var(CHUNK_SIZE_ENV) {
            config.chunk_size = raw.parse().map_err(|_| {
                Error::Validation(format!("{CHUNK_SIZE_ENV}={raw} is not a chunk size"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Validation("chunk_size must be > 0".to_string()));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(Error::Validation(format!(
                "compression_level {} outside 1-22",
                self.compression_level
            )));
        }
        Ok(())
    }
}

/// Parse an IANA timezone name; a leading `:` (as `TZ` allows) is ignored.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    let name = name.trim_start_matches(':');
    Tz::from_str(name).map_err(|_| Error::Validation(format!("unknown timezone: {name}")))
}
