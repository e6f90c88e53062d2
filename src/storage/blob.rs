//! Checksummed binary blobs and JSON sidecar files.
//!
//! A blob is laid out as
//!
//! ```text
//! magic: u32 | version: u16 | payload length: u64 | payload | crc32: u32
//! ```
//!
//! with all integers little-endian and the payload encoded with bincode.
//! The checksum covers the payload only. Any mismatch surfaces as an
//! [`TaxisError::Index`] so callers can tell corruption from absence.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, TaxisError};
use crate::storage::{Storage, read_all, write_atomic};

/// Magic number at the start of every blob ("TXIS").
pub const BLOB_MAGIC: u32 = 0x5349_5854;

/// Current blob format version.
pub const BLOB_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 8;

/// Encode `value` as a framed blob and write it atomically to `name`.
pub fn write_blob<T: Serialize>(storage: &dyn Storage, name: &str, value: &T) -> Result<()> {
    let payload = bincode::serialize(value)?;
    let mut buffer = Vec::with_capacity(HEADER_LEN + payload.len() + 4);
    buffer.write_u32::<LittleEndian>(BLOB_MAGIC)?;
    buffer.write_u16::<LittleEndian>(BLOB_VERSION)?;
    buffer.write_u64::<LittleEndian>(payload.len() as u64)?;
    buffer.extend_from_slice(&payload);
    buffer.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    write_atomic(storage, name, &buffer)
}

/// Read and verify a framed blob.
pub fn read_blob<T: DeserializeOwned>(storage: &dyn Storage, name: &str) -> Result<T> {
    let data = read_all(storage, name)?;
    decode_blob(name, &data)
}

fn decode_blob<T: DeserializeOwned>(name: &str, data: &[u8]) -> Result<T> {
    if data.len() < HEADER_LEN + 4 {
        return Err(TaxisError::index(format!("{name}: truncated blob")));
    }
    let mut reader = Cursor::new(data);
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != BLOB_MAGIC {
        return Err(TaxisError::index(format!("{name}: bad magic {magic:#x}")));
    }
    let version = reader.read_u16::<LittleEndian>()?;
    if version != BLOB_VERSION {
        return Err(TaxisError::index(format!(
            "{name}: unsupported version {version}"
        )));
    }
    let len = reader.read_u64::<LittleEndian>()? as usize;
    if data.len() != HEADER_LEN + len + 4 {
        return Err(TaxisError::index(format!("{name}: length mismatch")));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let stored = reader.read_u32::<LittleEndian>()?;
    if stored != crc32fast::hash(&payload) {
        return Err(TaxisError::index(format!("{name}: checksum mismatch")));
    }
    Ok(bincode::deserialize(&payload)?)
}

/// Write `value` as pretty-printed JSON, atomically.
pub fn write_json<T: Serialize>(storage: &dyn Storage, name: &str, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(storage, name, &data)
}

/// Read a JSON file, returning `None` when it does not exist.
pub fn read_json<T: DeserializeOwned>(storage: &dyn Storage, name: &str) -> Result<Option<T>> {
    if !storage.file_exists(name) {
        return Ok(None);
    }
    let data = read_all(storage, name)?;
    Ok(Some(serde_json::from_slice(&data)?))
}
