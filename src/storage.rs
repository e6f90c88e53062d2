//! Storage abstraction layer for Taxis.
//!
//! Every persistent structure (segments, the write-ahead log, the taxonomy,
//! the JSON sidecars and the suggestion lookups) goes through the [`Storage`]
//! trait, so an index can live on disk or entirely in memory.
//!
//! File names are `/`-separated relative paths. [`PrefixedStorage`] carves a
//! namespace out of another storage, which is how the `index`, `facet` and
//! `suggest/<field>` areas share one root.

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use crate::error::{Result, TaxisError};

pub mod blob;
pub mod file;
pub mod memory;
pub mod prefixed;

pub use blob::{read_blob, read_json, write_blob, write_json};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use prefixed::PrefixedStorage;

/// A trait for storage backends that can store and retrieve data.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open a file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any existing content.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Create a file for appending.
    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, recursively, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Rename a file, replacing the target if it exists.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Create a uniquely named temporary file next to `prefix`.
    fn create_temp_output(&self, prefix: &str) -> Result<(String, Box<dyn StorageOutput>)> {
        let temp_name = format!("{prefix}.{}.tmp", uuid::Uuid::new_v4().simple());
        let output = self.create_output(&temp_name)?;
        Ok((temp_name, output))
    }

    /// Sync all pending writes to storage.
    fn sync(&self) -> Result<()>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Seek + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Get the current position in the output stream.
    fn position(&self) -> Result<u64>;

    /// Close the output stream, publishing its content.
    fn close(&mut self) -> Result<()>;
}

/// Configuration for storage backends.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Buffer size for I/O operations.
    pub buffer_size: usize,

    /// Whether to sync every write to the device.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            buffer_size: 65536,
            sync_writes: false,
        }
    }
}

/// Write `data` to `name` atomically: a temporary sibling is written,
/// synced and then renamed over the target.
pub fn write_atomic(storage: &dyn Storage, name: &str, data: &[u8]) -> Result<()> {
    let (temp_name, mut output) = storage.create_temp_output(name)?;
    let written = output
        .write_all(data)
        .map_err(TaxisError::from)
        .and_then(|_| output.flush_and_sync())
        .and_then(|_| output.close());
    drop(output);
    if let Err(e) = written {
        let _ = storage.delete_file(&temp_name);
        return Err(e);
    }
    storage.rename_file(&temp_name, name)
}

/// Read the whole content of `name`.
pub fn read_all(storage: &dyn Storage, name: &str) -> Result<Vec<u8>> {
    let mut input = storage.open_input(name)?;
    let mut buffer = Vec::with_capacity(input.size()? as usize);
    input.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Convenience alias for shared storage handles.
pub type StorageRef = Arc<dyn Storage>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_content() {
        let storage = MemoryStorage::new_default();

        write_atomic(&storage, "conf.json", b"first").unwrap();
        write_atomic(&storage, "conf.json", b"second").unwrap();

        assert_eq!(read_all(&storage, "conf.json").unwrap(), b"second");
        // No temporary siblings are left behind.
        assert_eq!(storage.list_files().unwrap(), vec!["conf.json".to_string()]);
    }
}
