use std::sync::Arc;

use crate::error::Result;
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Storage facade that transparently prefixes all file names.
///
/// The index keeps its segments under `index/`, the taxonomy under `facet/`
/// and each suggestion lookup under `suggest/<field>/` of one root storage.
#[derive(Debug, Clone)]
pub struct PrefixedStorage {
    prefix: String,
    inner: Arc<dyn Storage>,
}

impl PrefixedStorage {
    /// Create a new prefixed storage namespace.
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Storage>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_matches('/').to_string();
        Self { prefix, inner }
    }

    /// The namespace of this view, without trailing separator.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn map_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else if name.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    fn strip_prefix<'a>(&self, name: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            return Some(name);
        }
        name.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

impl Storage for PrefixedStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(&self.map_name(name))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output(&self.map_name(name))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output_append(&self.map_name(name))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(&self.map_name(name))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(&self.map_name(name))
    }

    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .list_files()?
            .iter()
            .filter_map(|entry| self.strip_prefix(entry))
            .map(str::to_string)
            .collect())
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.inner.file_size(&self.map_name(name))
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.inner
            .rename_file(&self.map_name(old_name), &self.map_name(new_name))
    }

    fn create_temp_output(&self, prefix: &str) -> Result<(String, Box<dyn StorageOutput>)> {
        let (full_name, handle) = self.inner.create_temp_output(&self.map_name(prefix))?;
        let relative = self
            .strip_prefix(&full_name)
            .map(str::to_string)
            .unwrap_or(full_name.clone());
        Ok((relative, handle))
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn isolates_file_names() {
        let base: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let prefixed = PrefixedStorage::new("suggest/Name", base.clone());

        {
            let mut output = prefixed.create_output("lookup.bin").unwrap();
            output.write_all(b"data").unwrap();
            output.close().unwrap();
        }

        assert!(base.file_exists("suggest/Name/lookup.bin"));
        assert!(!base.file_exists("lookup.bin"));
        assert_eq!(prefixed.list_files().unwrap(), vec!["lookup.bin".to_string()]);

        // A sibling namespace sharing the leading characters stays invisible.
        let sibling = PrefixedStorage::new("suggest/Name2", base.clone());
        assert!(sibling.list_files().unwrap().is_empty());
    }

    #[test]
    fn temp_outputs_are_relative() {
        let base: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let prefixed = PrefixedStorage::new("index", base.clone());

        let (name, mut output) = prefixed.create_temp_output("segments.json").unwrap();
        output.write_all(b"[]").unwrap();
        output.close().unwrap();
        drop(output);

        assert!(name.starts_with("segments.json."));
        assert!(prefixed.file_exists(&name));
        assert!(base.file_exists(&format!("index/{name}")));
    }
}
