//! In-memory storage implementation for tests and throwaway indexes.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::{Result, TaxisError};
use crate::storage::{Storage, StorageConfig, StorageInput, StorageOutput};

type FileMap = Arc<Mutex<AHashMap<String, Arc<[u8]>>>>;

/// An in-memory storage implementation.
///
/// Outputs publish their buffer when they are synced, closed or dropped, so
/// a reader never observes a half-written file.
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileMap,
    #[allow(dead_code)]
    config: StorageConfig,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new(config: StorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(Mutex::new(AHashMap::new())),
            config,
        }
    }

    /// Create a new memory storage with default configuration.
    pub fn new_default() -> Self {
        Self::new(StorageConfig::default())
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Overwrite a file in place. Used by tests to simulate corruption.
    pub fn put(&self, name: &str, data: &[u8]) {
        self.files.lock().insert(name.to_string(), Arc::from(data));
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new_default()
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .cloned()
            .ok_or_else(|| TaxisError::not_found(name))?;
        Ok(Box::new(MemoryInput::new(data)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.files.lock().insert(name.to_string(), Arc::from(&[][..]));
        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            Vec::new(),
            Arc::clone(&self.files),
        )))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let existing = self
            .files
            .lock()
            .get(name)
            .map(|data| data.to_vec())
            .unwrap_or_default();
        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            existing,
            Arc::clone(&self.files),
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.files
            .lock()
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| TaxisError::not_found(name))
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(old_name)
            .ok_or_else(|| TaxisError::not_found(old_name))?;
        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// A memory-based input implementation.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Arc<[u8]>>,
    size: u64,
}

impl MemoryInput {
    fn new(data: Arc<[u8]>) -> Self {
        let size = data.len() as u64;
        MemoryInput {
            cursor: Cursor::new(data),
            size,
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// A memory-based output implementation.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Cursor<Vec<u8>>,
    files: FileMap,
    dirty: bool,
}

impl MemoryOutput {
    fn new(name: String, existing: Vec<u8>, files: FileMap) -> Self {
        let mut buffer = Cursor::new(existing);
        buffer.set_position(buffer.get_ref().len() as u64);
        MemoryOutput {
            name,
            buffer,
            files,
            dirty: false,
        }
    }

    fn publish(&mut self) {
        self.dirty = false;
        self.files
            .lock()
            .insert(self.name.clone(), Arc::from(self.buffer.get_ref().as_slice()));
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.dirty = true;
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryOutput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.publish();
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.buffer.position())
    }

    fn close(&mut self) -> Result<()> {
        self.publish();
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        if self.dirty {
            self.publish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_visible_after_sync() {
        let storage = MemoryStorage::new_default();
        let mut output = storage.create_output_append("wal.log").unwrap();
        output.write_all(b"one").unwrap();
        assert!(!storage.file_exists("wal.log"));
        drop(output);
        assert_eq!(storage.file_size("wal.log").unwrap(), 3);
        storage.delete_file("wal.log").unwrap();

        let mut output = storage.create_output_append("wal.log").unwrap();
        output.write_all(b"one").unwrap();

        output.flush_and_sync().unwrap();
        assert_eq!(storage.file_size("wal.log").unwrap(), 3);

        output.write_all(b"two").unwrap();
        output.flush_and_sync().unwrap();
        let mut content = String::new();
        storage
            .open_input("wal.log")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "onetwo");
    }

    #[test]
    fn test_rename_and_delete() {
        let storage = MemoryStorage::new_default();
        storage.put("a", b"x");
        storage.rename_file("a", "b").unwrap();
        assert!(!storage.file_exists("a"));
        assert!(storage.file_exists("b"));
        storage.delete_file("b").unwrap();
        assert_eq!(storage.file_count(), 0);
        assert!(storage.rename_file("a", "c").unwrap_err().is_not_found());
    }
}
