use std::sync::Arc;

use parking_lot::Mutex;
use taxis::entity::MemoryResolver;
use taxis::prelude::*;
use taxis::storage::{MemoryStorage, Storage, StorageInput, StorageOutput};

#[derive(Debug)]
struct Product {
    id: i64,
    moiety: &'static str,
}

impl Indexable for Product {
    fn kind(&self) -> &str {
        "ix.test.Product"
    }

    fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
        fields.id("id", self.id).field_with(
            "moiety",
            IndexPolicy::new().suggest().named("Active Moiety"),
            self.moiety,
        );
    }
}

/// Storage whose writes under one prefix fail while it is set.
#[derive(Debug)]
struct Flaky {
    inner: MemoryStorage,
    failing: Mutex<Option<&'static str>>,
}

impl Flaky {
    fn new() -> Self {
        Flaky {
            inner: MemoryStorage::new_default(),
            failing: Mutex::new(None),
        }
    }

    fn fail_under(&self, prefix: Option<&'static str>) {
        *self.failing.lock() = prefix;
    }

    fn check(&self, name: &str) -> Result<()> {
        match *self.failing.lock() {
            Some(prefix) if name.starts_with(prefix) => Err(TaxisError::storage("disk full")),
            _ => Ok(()),
        }
    }
}

impl Storage for Flaky {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(name)
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check(name)?;
        self.inner.create_output(name)
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output_append(name)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.inner.list_files()
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.inner.file_size(name)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.check(new_name)?;
        self.inner.rename_file(old_name, new_name)
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}

fn on_storage(storage: Arc<dyn Storage>) -> TextIndexer {
    TextIndexer::builder()
        .storage(storage)
        .resolver(Arc::new(MemoryResolver::new()))
        .build()
        .unwrap()
}

#[test]
fn test_broken_lookup_is_rebuilt_for_a_spaced_field() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(MemoryResolver::new());
    {
        let indexer = TextIndexer::open_dir(dir.path(), resolver.clone()).unwrap();
        indexer.add(&Product { id: 1, moiety: "Acetaminophen" }).unwrap();
        indexer.add(&Product { id: 2, moiety: "Codeine" }).unwrap();
        indexer.shutdown().unwrap();
    }
    let lookup = dir.path().join("suggest").join("Active_Moiety").join("lookup.bin");
    assert!(lookup.exists());
    std::fs::write(&lookup, b"garbage").unwrap();

    let reopened = TextIndexer::open_dir(dir.path(), resolver).unwrap();
    assert_eq!(reopened.size(), 2);
    let found = reopened.suggest(Some("Active Moiety"), "acet", 10);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "Acetaminophen");
    assert_eq!(reopened.suggest(Some("Active Moiety"), "cod", 10).len(), 1);
    reopened.shutdown().unwrap();
}

#[test]
fn test_failed_commit_keeps_one_document_per_id() {
    let storage = Arc::new(Flaky::new());
    {
        let indexer = on_storage(storage.clone());
        for id in 1..=3 {
            indexer.add(&Product { id, moiety: "Codeine" }).unwrap();
        }
        storage.fail_under(Some("facet/"));
        assert!(indexer.commit().is_err());
    }
    storage.fail_under(None);

    let reopened = on_storage(storage.clone());
    assert_eq!(reopened.size(), 3);
    assert_eq!(reopened.remove(&Product { id: 1, moiety: "Codeine" }).unwrap(), 1);
    assert_eq!(reopened.size(), 2);
    reopened.shutdown().unwrap();

    assert_eq!(on_storage(storage).size(), 2);
}

#[test]
fn test_commit_failing_after_the_manifest_replays_nothing_twice() {
    let storage = Arc::new(Flaky::new());
    {
        let indexer = on_storage(storage.clone());
        for id in 1..=3 {
            indexer.add(&Product { id, moiety: "Codeine" }).unwrap();
        }
        indexer.update(&Product { id: 2, moiety: "Morphine" }).unwrap();
        storage.fail_under(Some("index/index.wal"));
        assert!(indexer.commit().is_err());
    }
    storage.fail_under(None);

    let reopened = on_storage(storage);
    assert_eq!(reopened.size(), 3);
    assert_eq!(reopened.remove(&Product { id: 2, moiety: "Morphine" }).unwrap(), 1);
    reopened.shutdown().unwrap();
}
