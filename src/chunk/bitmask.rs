//! Presence masks packed eight rows to a byte, most significant bit first.

use crate::error::{Error, Result};

pub fn packed_len(rows: usize) -> usize {
    rows.div_ceil(8)
}

pub fn pack(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; packed_len(bits.len())];
    for (i, &set) in bits.iter().enumerate() {
        if set {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
    out
}

pub fn unpack(bytes: &[u8], rows: usize) -> Result<Vec<bool>> {
    if bytes.len() < packed_len(rows) {
        return Err(Error::Corrupt("presence mask shorter than row count"));
    }
    Ok((0..rows)
        .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
        .collect())
}
